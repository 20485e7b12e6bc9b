//! # escrow-core: Foundational Types for the Sale Escrow Ledger
//!
//! Every other crate in the workspace depends on `escrow-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** `AccountId`, `TokenRef`,
//!    `SaleId` and `Amount` are distinct types with validated constructors.
//!    A token reference cannot be passed where a party is expected.
//!
//! 2. **`CanonicalBytes` newtype.** Audit digests are computed only over
//!    bytes produced by `CanonicalBytes::new()` (sorted keys, compact
//!    separators, no floats).
//!
//! 3. **UTC-only timestamps.** `Timestamp` is UTC with seconds precision so
//!    that the same instant always canonicalizes to the same bytes.
//!
//! ## Crate Policy
//!
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod amount;
pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod temporal;

// Re-export primary types for ergonomic imports.
pub use amount::Amount;
pub use canonical::CanonicalBytes;
pub use digest::{chain_digest, sha256_digest, ContentDigest, DigestAlgorithm};
pub use error::{CanonicalizationError, CoreError};
pub use identity::{AccountId, SaleId, TokenRef};
pub use temporal::Timestamp;
