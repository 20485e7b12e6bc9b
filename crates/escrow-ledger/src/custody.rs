//! # Value Custody
//!
//! The ledger never holds value itself: it instructs external value rails to
//! move value into and out of its custody account.
//!
//! - [`NativeRail`] pushes native currency from one account to another.
//! - [`TokenRail`] exposes a fungible token's `allowance`, `transfer_from`
//!   (pull) and `transfer` (push).
//!
//! Each [`Asset`] variant gets one implementation of the [`Custody`]
//! capability (`debit` into custody, `credit` out of custody). The ledger
//! obtains one through [`Asset::custody`] and calls only the trait.
//!
//! ## Security Invariant
//!
//! Rails are untrusted: a call into a rail may re-enter the ledger. The
//! ledger never holds its lock across a rail call and marks every
//! transition before crediting value out.

use std::collections::BTreeMap;

use thiserror::Error;

use escrow_core::{AccountId, Amount, TokenRef};

use crate::sale::Asset;

// ── Rails ──────────────────────────────────────────────────────────────

/// Failure reported by a value rail. A failed rail call moved nothing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The paying account does not hold enough value.
    #[error("{account} holds {available}, needs {required}")]
    InsufficientFunds {
        /// The paying account.
        account: AccountId,
        /// Amount requested.
        required: Amount,
        /// Amount available.
        available: Amount,
    },

    /// The spender's allowance does not cover a pull.
    #[error("allowance of {spender} over {owner} is {available}, needs {required}")]
    AllowanceExceeded {
        /// Account whose funds are pulled.
        owner: AccountId,
        /// Account performing the pull.
        spender: AccountId,
        /// Amount requested.
        required: Amount,
        /// Allowance remaining.
        available: Amount,
    },

    /// The recipient refused the payment.
    #[error("payment to {recipient} rejected: {reason}")]
    Rejected {
        /// The refusing account.
        recipient: AccountId,
        /// Rail-supplied reason.
        reason: String,
    },

    /// A balance would overflow.
    #[error("balance overflow crediting {account}")]
    Overflow {
        /// The account whose balance would overflow.
        account: AccountId,
    },
}

/// Native-currency transfer primitive.
pub trait NativeRail {
    /// Move `amount` of native currency from `from` to `to`, atomically.
    fn pay(&mut self, from: &AccountId, to: &AccountId, amount: Amount)
        -> Result<(), TransferError>;
}

/// Fungible-token transfer primitives.
pub trait TokenRail {
    /// How much `spender` may still pull from `owner`.
    fn allowance(&self, token: &TokenRef, owner: &AccountId, spender: &AccountId) -> Amount;

    /// Pull `amount` from `from` to `to` using `spender`'s allowance.
    fn transfer_from(
        &mut self,
        token: &TokenRef,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TransferError>;

    /// Push `amount` from `from` to `to`.
    fn transfer(
        &mut self,
        token: &TokenRef,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TransferError>;
}

/// Everything the ledger needs to move value of any asset.
pub trait ValueRails: NativeRail + TokenRail {}

impl<T: NativeRail + TokenRail + ?Sized> ValueRails for T {}

// ── Custody capability ─────────────────────────────────────────────────

/// Failure to take or release custody.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustodyError {
    /// The native value attached to the call does not match the sale.
    #[error("attached value {attached} does not match required deposit {expected}")]
    InvalidDeposit {
        /// Value the call must carry.
        expected: Amount,
        /// Value the call carried.
        attached: Amount,
    },

    /// The buyer's token allowance to the custody account is too small.
    #[error("allowance of {owner} for {token} is {available}, sale needs {required}")]
    InsufficientAllowance {
        /// The escrowed token.
        token: TokenRef,
        /// The buyer.
        owner: AccountId,
        /// The sale amount.
        required: Amount,
        /// Allowance granted to the custody account.
        available: Amount,
    },

    /// The rail refused the movement.
    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),

    /// The custody book would go negative or overflow.
    #[error("custody book for {asset} cannot {action} {amount}")]
    Accounting {
        /// The affected asset.
        asset: Asset,
        /// `"hold"` or `"release"`.
        action: &'static str,
        /// The amount involved.
        amount: Amount,
    },
}

/// Capability to move one asset into and out of the ledger's custody.
pub trait Custody {
    /// Take `amount` from `from` into custody.
    fn debit(&mut self, from: &AccountId, amount: Amount) -> Result<(), CustodyError>;

    /// Release `amount` from custody to `to`.
    fn credit(&mut self, to: &AccountId, amount: Amount) -> Result<(), CustodyError>;
}

/// Custody of native currency. Deposits arrive attached to the creating call.
pub struct NativeCustody<'a, R: ?Sized> {
    rails: &'a mut R,
    vault: &'a AccountId,
    attached: Amount,
}

impl<R: NativeRail + ?Sized> Custody for NativeCustody<'_, R> {
    fn debit(&mut self, from: &AccountId, amount: Amount) -> Result<(), CustodyError> {
        if self.attached != amount {
            return Err(CustodyError::InvalidDeposit {
                expected: amount,
                attached: self.attached,
            });
        }
        self.rails.pay(from, self.vault, amount)?;
        Ok(())
    }

    fn credit(&mut self, to: &AccountId, amount: Amount) -> Result<(), CustodyError> {
        self.rails.pay(self.vault, to, amount)?;
        Ok(())
    }
}

/// Custody of a fungible token. Deposits are pulled through an allowance
/// the buyer granted to the custody account.
pub struct TokenCustody<'a, R: ?Sized> {
    rails: &'a mut R,
    vault: &'a AccountId,
    token: &'a TokenRef,
    attached: Amount,
}

impl<R: TokenRail + ?Sized> Custody for TokenCustody<'_, R> {
    fn debit(&mut self, from: &AccountId, amount: Amount) -> Result<(), CustodyError> {
        // Native value sent along with a token sale would be stranded.
        if !self.attached.is_zero() {
            return Err(CustodyError::InvalidDeposit {
                expected: Amount::ZERO,
                attached: self.attached,
            });
        }
        let available = self.rails.allowance(self.token, from, self.vault);
        if available < amount {
            return Err(CustodyError::InsufficientAllowance {
                token: self.token.clone(),
                owner: from.clone(),
                required: amount,
                available,
            });
        }
        self.rails
            .transfer_from(self.token, self.vault, from, self.vault, amount)?;
        Ok(())
    }

    fn credit(&mut self, to: &AccountId, amount: Amount) -> Result<(), CustodyError> {
        self.rails.transfer(self.token, self.vault, to, amount)?;
        Ok(())
    }
}

impl Asset {
    /// The custody capability for this asset.
    ///
    /// `vault` is the ledger's custody account. `attached` is the native
    /// value carried by the current call; it only matters for `debit`.
    pub fn custody<'a, R: ValueRails + ?Sized + 'a>(
        &'a self,
        rails: &'a mut R,
        vault: &'a AccountId,
        attached: Amount,
    ) -> Box<dyn Custody + 'a> {
        match self {
            Asset::Native => Box::new(NativeCustody {
                rails,
                vault,
                attached,
            }),
            Asset::Token(token) => Box::new(TokenCustody {
                rails,
                vault,
                token,
                attached,
            }),
        }
    }
}

// ── Custody book ───────────────────────────────────────────────────────

/// Value currently held in custody, per asset.
///
/// Equal, per asset, to the sum of the amounts of all sales whose status
/// holds custody.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustodyBook {
    held: BTreeMap<Asset, Amount>,
}

impl CustodyBook {
    /// An empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Amount of `asset` held.
    pub fn held(&self, asset: &Asset) -> Amount {
        self.held.get(asset).copied().unwrap_or(Amount::ZERO)
    }

    /// Record `amount` of `asset` entering custody.
    pub fn hold(&mut self, asset: &Asset, amount: Amount) -> Result<(), CustodyError> {
        let next = self
            .held(asset)
            .checked_add(amount)
            .ok_or_else(|| CustodyError::Accounting {
                asset: asset.clone(),
                action: "hold",
                amount,
            })?;
        self.held.insert(asset.clone(), next);
        Ok(())
    }

    /// Record `amount` of `asset` leaving custody.
    pub fn release(&mut self, asset: &Asset, amount: Amount) -> Result<(), CustodyError> {
        let next = self
            .held(asset)
            .checked_sub(amount)
            .ok_or_else(|| CustodyError::Accounting {
                asset: asset.clone(),
                action: "release",
                amount,
            })?;
        if next.is_zero() {
            self.held.remove(asset);
        } else {
            self.held.insert(asset.clone(), next);
        }
        Ok(())
    }
}
