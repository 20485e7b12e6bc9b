//! # escrow-ledger: Sale Escrow Ledger
//!
//! Mediates a two-party value transfer with optional third-party dispute
//! arbitration:
//!
//! - **Sale** ([`sale`]): the sale record, its status machine, and the
//!   authorization rules for each transition.
//!
//! - **Custody** ([`custody`]): the value rails the ledger calls out to, the
//!   per-asset `Custody` capability, and the book of value currently held.
//!
//! - **Store** ([`store`]): the append-only mapping of sale ids to records.
//!
//! - **Events** ([`event`], [`audit`]): the events emitted on every committed
//!   transition and the hash-chained trail they are recorded in.
//!
//! - **Ledger** ([`ledger`]): [`EscrowLedger`], the single authority that
//!   exposes create, complete, cancel, raise-dispute and resolve-dispute.
//!
//! ## State Machine
//!
//! ```text
//! Pending ──complete──▶ Completed (terminal)
//! Pending ──cancel────▶ Cancelled (terminal)
//! Pending ──raise_dispute──▶ Disputed ──resolve_dispute──▶ Completed
//! ```

pub mod audit;
pub mod config;
pub mod custody;
pub mod error;
pub mod event;
pub mod ledger;
pub mod sale;
pub mod store;

// Re-export primary types.
pub use audit::{AuditEntry, AuditError, AuditTrail};
pub use config::{ConfigError, LedgerConfig};
pub use custody::{
    Custody, CustodyBook, CustodyError, NativeRail, TokenRail, TransferError, ValueRails,
};
pub use error::{ErrorKind, LedgerError};
pub use event::SaleEvent;
pub use ledger::{CallContext, EscrowLedger};
pub use sale::{Asset, Operation, Sale, SaleStatus, SaleTerms, Settlement};
pub use store::SaleStore;
