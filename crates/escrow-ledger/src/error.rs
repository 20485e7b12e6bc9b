//! # Ledger Error Types
//!
//! Every ledger rejection is a [`LedgerError`]. Variants carry the sale id,
//! the caller and the status at the time of failure so that a rejected call
//! can be diagnosed from the error alone. [`LedgerError::kind`] groups the
//! variants into the coarse categories callers branch on.
//!
//! A rejected call has no observable effect on the ledger.

use thiserror::Error;

use escrow_core::{AccountId, CanonicalizationError, SaleId};

use crate::custody::CustodyError;
use crate::sale::{Operation, SaleStatus};

/// Coarse classification of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input: same buyer and seller, the custody account as a
    /// party, zero amount, wrong deposit.
    Validation,
    /// Caller is not allowed to perform the operation on this sale.
    Authorization,
    /// The sale's status does not permit the operation.
    InvalidState,
    /// Declared dispute winner is neither buyer nor seller.
    InvalidWinner,
    /// Insufficient allowance or failed value movement.
    Custody,
    /// No sale exists with the given id.
    NotFound,
    /// An event could not be canonicalized for the audit trail.
    Integrity,
}

/// Errors arising from ledger operations.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Buyer and seller are the same account.
    #[error("buyer and seller must differ (both are {party})")]
    SameParty {
        /// The account named on both sides.
        party: AccountId,
    },

    /// The custody account is named as the buyer or the seller.
    #[error("custody account {account} cannot be the {role} of a sale")]
    CustodyAccountAsParty {
        /// The custody account.
        account: AccountId,
        /// `"buyer"` or `"seller"`.
        role: &'static str,
    },

    /// Sale amount is zero.
    #[error("sale amount must be positive")]
    ZeroAmount,

    /// Caller is not permitted to perform the operation.
    #[error("{caller} is not authorized to {operation} on {sale_id}")]
    Unauthorized {
        /// The sale the call targeted.
        sale_id: SaleId,
        /// The rejected caller.
        caller: AccountId,
        /// The attempted operation.
        operation: Operation,
    },

    /// The sale's status does not permit the operation.
    #[error("cannot {operation} {sale_id} in status {status}: {reason}")]
    InvalidState {
        /// The sale the call targeted.
        sale_id: SaleId,
        /// The attempted operation.
        operation: Operation,
        /// The status at the time of the call.
        status: SaleStatus,
        /// Which status the operation requires.
        reason: &'static str,
    },

    /// Declared dispute winner is not a party to the sale.
    #[error("winner {winner} of {sale_id} must be the buyer or the seller")]
    InvalidWinner {
        /// The disputed sale.
        sale_id: SaleId,
        /// The rejected winner.
        winner: AccountId,
    },

    /// Taking or releasing custody failed.
    #[error("custody failure during {operation}: {source}")]
    Custody {
        /// The operation that moved value.
        operation: Operation,
        /// What went wrong.
        #[source]
        source: CustodyError,
    },

    /// No sale with this id.
    #[error("{0} does not exist")]
    SaleNotFound(SaleId),

    /// The sale id space is exhausted.
    #[error("sale id space exhausted")]
    SaleIdExhausted,

    /// An event could not be canonicalized for the audit trail.
    #[error("audit canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),
}

impl LedgerError {
    /// The coarse category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SameParty { .. }
            | Self::CustodyAccountAsParty { .. }
            | Self::ZeroAmount
            | Self::SaleIdExhausted => ErrorKind::Validation,
            Self::Custody {
                source: CustodyError::InvalidDeposit { .. },
                ..
            } => ErrorKind::Validation,
            Self::Custody { .. } => ErrorKind::Custody,
            Self::Unauthorized { .. } => ErrorKind::Authorization,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::InvalidWinner { .. } => ErrorKind::InvalidWinner,
            Self::SaleNotFound(_) => ErrorKind::NotFound,
            Self::Canonicalization(_) => ErrorKind::Integrity,
        }
    }

    pub(crate) fn custody(operation: Operation, source: CustodyError) -> Self {
        Self::Custody { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::TransferError;
    use escrow_core::Amount;

    fn account(name: &str) -> AccountId {
        AccountId::new(name).unwrap()
    }

    #[test]
    fn unauthorized_display() {
        let err = LedgerError::Unauthorized {
            sale_id: SaleId::new(7).unwrap(),
            caller: account("mallory"),
            operation: Operation::Complete,
        };
        let msg = err.to_string();
        assert!(msg.contains("mallory"));
        assert!(msg.contains("complete_sale"));
        assert!(msg.contains("sale:7"));
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn invalid_state_display() {
        let err = LedgerError::InvalidState {
            sale_id: SaleId::FIRST,
            operation: Operation::Cancel,
            status: SaleStatus::Completed,
            reason: "sale is not pending",
        };
        let msg = err.to_string();
        assert!(msg.contains("COMPLETED"));
        assert!(msg.contains("sale is not pending"));
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn deposit_mismatch_is_validation() {
        let err = LedgerError::custody(
            Operation::Create,
            CustodyError::InvalidDeposit {
                expected: Amount::new(100),
                attached: Amount::new(99),
            },
        );
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("99"));
    }

    #[test]
    fn transfer_failure_is_custody() {
        let err = LedgerError::custody(
            Operation::Complete,
            CustodyError::Transfer(TransferError::Rejected {
                recipient: account("bob"),
                reason: "recipient refuses payment".to_string(),
            }),
        );
        assert_eq!(err.kind(), ErrorKind::Custody);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn not_found_kind() {
        let err = LedgerError::SaleNotFound(SaleId::new(99).unwrap());
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "sale:99 does not exist");
    }

    #[test]
    fn custody_account_as_party_is_validation() {
        let err = LedgerError::CustodyAccountAsParty {
            account: account("vault"),
            role: "seller",
        };
        assert_eq!(
            err.to_string(),
            "custody account vault cannot be the seller of a sale"
        );
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn same_party_display() {
        let err = LedgerError::SameParty {
            party: account("alice"),
        };
        assert!(err.to_string().contains("alice"));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
