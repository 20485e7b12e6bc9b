//! # Sale Record and Status Machine
//!
//! A [`Sale`] tracks one escrowed transfer from a buyer to a seller. The
//! transition methods on `Sale` are the only code that changes `status` or
//! `arbiter`; each one checks the caller's role and the current status, then
//! marks the new status and returns a [`Settlement`] describing the value the
//! ledger must release.
//!
//! ## Security Invariant
//!
//! A transition marks the new status *before* any value leaves custody.
//! A re-entrant call made while the transfer is in flight therefore sees a
//! terminal status and is rejected, and the only way back is
//! [`Sale::revert`], which the ledger calls when the transfer fails.

use serde::{Deserialize, Serialize};

use escrow_core::{AccountId, Amount, SaleId, Timestamp, TokenRef};

use crate::error::LedgerError;
use crate::event::SaleEvent;

// ── Asset ──────────────────────────────────────────────────────────────

/// The medium of value for a sale.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    /// The rail's native currency, attached to the creating call.
    Native,
    /// A fungible token, pulled from the buyer through an allowance.
    Token(TokenRef),
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => f.write_str("native"),
            Self::Token(token) => write!(f, "{token}"),
        }
    }
}

// ── Status ─────────────────────────────────────────────────────────────

/// Lifecycle status of a sale.
///
/// Terminal states: `Completed`, `Cancelled`. `Disputed` is transient and
/// resolves only to `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaleStatus {
    /// Value is in custody; awaiting completion, cancellation or dispute.
    Pending,
    /// Value released to the seller, or to the winner of a dispute.
    Completed,
    /// Value refunded to the buyer.
    Cancelled,
    /// Value frozen until the designated arbiter resolves.
    Disputed,
}

impl SaleStatus {
    /// Every status, in declaration order.
    pub const ALL: [SaleStatus; 4] = [
        SaleStatus::Pending,
        SaleStatus::Completed,
        SaleStatus::Cancelled,
        SaleStatus::Disputed,
    ];

    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Disputed => "DISPUTED",
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether the sale's amount is held in custody in this status.
    pub fn holds_custody(&self) -> bool {
        matches!(self, Self::Pending | Self::Disputed)
    }

    /// Statuses reachable from this one in a single transition.
    pub fn valid_transitions(&self) -> &'static [SaleStatus] {
        match self {
            Self::Pending => &[Self::Completed, Self::Cancelled, Self::Disputed],
            Self::Disputed => &[Self::Completed],
            Self::Completed | Self::Cancelled => &[],
        }
    }

    /// Whether `to` is reachable from this status in a single transition.
    pub fn can_transition_to(&self, to: SaleStatus) -> bool {
        self.valid_transitions().contains(&to)
    }
}

impl std::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Operations ─────────────────────────────────────────────────────────

/// The ledger operations, used to label errors and log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// `create_sale`.
    Create,
    /// `complete_sale`.
    Complete,
    /// `cancel_sale`.
    Cancel,
    /// `raise_dispute`.
    RaiseDispute,
    /// `resolve_dispute`.
    ResolveDispute,
}

impl Operation {
    /// The operation name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create_sale",
            Self::Complete => "complete_sale",
            Self::Cancel => "cancel_sale",
            Self::RaiseDispute => "raise_dispute",
            Self::ResolveDispute => "resolve_dispute",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Terms ──────────────────────────────────────────────────────────────

/// The immutable terms a sale is opened with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTerms {
    /// The creating party, who deposits the value.
    pub buyer: AccountId,
    /// The counterparty who receives the value on completion.
    pub seller: AccountId,
    /// Quantity of `asset`, in smallest units.
    pub amount: Amount,
    /// What is being escrowed.
    pub asset: Asset,
}

impl SaleTerms {
    /// Check the creation constraints: distinct parties, positive amount.
    ///
    /// # Errors
    ///
    /// [`LedgerError::SameParty`] or [`LedgerError::ZeroAmount`].
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.buyer == self.seller {
            return Err(LedgerError::SameParty {
                party: self.buyer.clone(),
            });
        }
        if self.amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        Ok(())
    }
}

// ── Settlement ─────────────────────────────────────────────────────────

/// Value the ledger must release after a transition was marked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// The sale being settled.
    pub sale_id: SaleId,
    /// Who receives the custodied value.
    pub recipient: AccountId,
    /// Asset to release.
    pub asset: Asset,
    /// Amount to release; always the sale's full amount.
    pub amount: Amount,
    /// Status before the transition, restored if the release fails.
    pub prior: SaleStatus,
    /// `updated_at` before the transition, restored with `prior`.
    pub prior_updated_at: Timestamp,
    /// Event to emit once the release succeeds.
    pub event: SaleEvent,
}

// ── Sale ───────────────────────────────────────────────────────────────

/// One escrow transaction record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    /// Sequential identifier, starting at 1.
    pub id: SaleId,
    /// The creator and depositor.
    pub buyer: AccountId,
    /// The counterparty named by the buyer.
    pub seller: AccountId,
    /// Escrowed quantity; never mutated.
    pub amount: Amount,
    /// Escrowed asset; never mutated.
    pub asset: Asset,
    /// Current lifecycle status.
    pub status: SaleStatus,
    /// Set once, when a dispute is raised.
    pub arbiter: Option<AccountId>,
    /// When the sale was created.
    pub created_at: Timestamp,
    /// When the status last changed.
    pub updated_at: Timestamp,
}

impl Sale {
    /// Open a new `Pending` sale with no arbiter.
    pub(crate) fn open(id: SaleId, terms: SaleTerms) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            buyer: terms.buyer,
            seller: terms.seller,
            amount: terms.amount,
            asset: terms.asset,
            status: SaleStatus::Pending,
            arbiter: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `account` is the buyer or the seller.
    pub fn is_party(&self, account: &AccountId) -> bool {
        *account == self.buyer || *account == self.seller
    }

    /// Whether `account` is the buyer, the seller, or the arbiter.
    pub fn involves(&self, account: &AccountId) -> bool {
        self.is_party(account) || self.arbiter.as_ref() == Some(account)
    }

    /// Release the value to the seller. `Pending → Completed`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] unless `caller` is buyer or seller;
    /// [`LedgerError::InvalidState`] unless the sale is `Pending`.
    pub(crate) fn complete(&mut self, caller: &AccountId) -> Result<Settlement, LedgerError> {
        self.require_party(caller, Operation::Complete)?;
        self.require_status(SaleStatus::Pending, Operation::Complete)?;
        let (prior, prior_updated_at) = self.mark(SaleStatus::Completed);
        Ok(Settlement {
            sale_id: self.id,
            recipient: self.seller.clone(),
            asset: self.asset.clone(),
            amount: self.amount,
            prior,
            prior_updated_at,
            event: SaleEvent::SaleCompleted { sale_id: self.id },
        })
    }

    /// Refund the value to the buyer. `Pending → Cancelled`.
    ///
    /// # Errors
    ///
    /// Same as [`Sale::complete`].
    pub(crate) fn cancel(&mut self, caller: &AccountId) -> Result<Settlement, LedgerError> {
        self.require_party(caller, Operation::Cancel)?;
        self.require_status(SaleStatus::Pending, Operation::Cancel)?;
        let (prior, prior_updated_at) = self.mark(SaleStatus::Cancelled);
        Ok(Settlement {
            sale_id: self.id,
            recipient: self.buyer.clone(),
            asset: self.asset.clone(),
            amount: self.amount,
            prior,
            prior_updated_at,
            event: SaleEvent::SaleCancelled { sale_id: self.id },
        })
    }

    /// Freeze the sale and name its arbiter. `Pending → Disputed`.
    ///
    /// The arbiter is not checked against the parties.
    ///
    /// # Errors
    ///
    /// Same as [`Sale::complete`].
    pub(crate) fn raise_dispute(
        &mut self,
        caller: &AccountId,
        arbiter: AccountId,
    ) -> Result<SaleEvent, LedgerError> {
        self.require_party(caller, Operation::RaiseDispute)?;
        self.require_status(SaleStatus::Pending, Operation::RaiseDispute)?;
        self.arbiter = Some(arbiter);
        self.mark(SaleStatus::Disputed);
        Ok(SaleEvent::SaleDisputed { sale_id: self.id })
    }

    /// Award the value to `winner`. `Disputed → Completed`.
    ///
    /// The status is checked first, so any caller of a sale that is not
    /// disputed (including one already resolved) gets `InvalidState`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidState`] unless `Disputed`;
    /// [`LedgerError::Unauthorized`] unless `caller` is the stored arbiter;
    /// [`LedgerError::InvalidWinner`] unless `winner` is buyer or seller.
    pub(crate) fn resolve(
        &mut self,
        caller: &AccountId,
        winner: &AccountId,
    ) -> Result<Settlement, LedgerError> {
        self.require_status(SaleStatus::Disputed, Operation::ResolveDispute)?;
        if self.arbiter.as_ref() != Some(caller) {
            return Err(self.unauthorized(caller, Operation::ResolveDispute));
        }
        if !self.is_party(winner) {
            return Err(LedgerError::InvalidWinner {
                sale_id: self.id,
                winner: winner.clone(),
            });
        }
        let (prior, prior_updated_at) = self.mark(SaleStatus::Completed);
        Ok(Settlement {
            sale_id: self.id,
            recipient: winner.clone(),
            asset: self.asset.clone(),
            amount: self.amount,
            prior,
            prior_updated_at,
            event: SaleEvent::DisputeResolved {
                sale_id: self.id,
                winner: winner.clone(),
            },
        })
    }

    /// Undo a marked transition whose value release failed.
    pub(crate) fn revert(&mut self, settlement: &Settlement) {
        self.status = settlement.prior;
        self.updated_at = settlement.prior_updated_at;
    }

    fn mark(&mut self, next: SaleStatus) -> (SaleStatus, Timestamp) {
        let prior = (self.status, self.updated_at);
        self.status = next;
        self.updated_at = Timestamp::now();
        prior
    }

    fn require_party(&self, caller: &AccountId, operation: Operation) -> Result<(), LedgerError> {
        if self.is_party(caller) {
            Ok(())
        } else {
            Err(self.unauthorized(caller, operation))
        }
    }

    fn require_status(&self, expected: SaleStatus, operation: Operation) -> Result<(), LedgerError> {
        if self.status == expected {
            return Ok(());
        }
        Err(LedgerError::InvalidState {
            sale_id: self.id,
            operation,
            status: self.status,
            reason: match expected {
                SaleStatus::Disputed => "sale is not disputed",
                _ => "sale is not pending",
            },
        })
    }

    fn unauthorized(&self, caller: &AccountId, operation: Operation) -> LedgerError {
        LedgerError::Unauthorized {
            sale_id: self.id,
            caller: caller.clone(),
            operation,
        }
    }
}
