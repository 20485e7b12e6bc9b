//! # escrow-testkit: Paper Value Rails
//!
//! [`PaperBank`] implements the ledger's [`NativeRail`] and [`TokenRail`]
//! over in-memory balances. Every movement is atomic: a refused call moves
//! nothing. No randomness, no I/O.
//!
//! Two hooks exercise the ledger's failure paths:
//!
//! - [`PaperBank::reject_payments_to`] makes every payment to an account
//!   fail with [`TransferError::Rejected`].
//! - [`PaperBank::on_payment`] runs a callback after each successful
//!   movement, with the bank itself, so the callback can call back into the
//!   ledger the way a hostile recipient would.

use std::collections::{BTreeMap, BTreeSet};

use escrow_core::{AccountId, Amount, TokenRef};
use escrow_ledger::{Asset, NativeRail, TokenRail, TransferError};

/// One completed value movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    /// What moved.
    pub asset: Asset,
    /// Paying account.
    pub from: AccountId,
    /// Receiving account.
    pub to: AccountId,
    /// How much.
    pub amount: Amount,
}

/// Callback run after every successful movement.
pub type PaymentHook = Box<dyn FnMut(&mut PaperBank, &TransferRecord)>;

/// Deterministic in-memory value rails.
#[derive(Default)]
pub struct PaperBank {
    native: BTreeMap<AccountId, Amount>,
    tokens: BTreeMap<(TokenRef, AccountId), Amount>,
    allowances: BTreeMap<(TokenRef, AccountId, AccountId), Amount>,
    rejecting: BTreeSet<AccountId>,
    transfers: Vec<TransferRecord>,
    on_payment: Option<PaymentHook>,
}

impl std::fmt::Debug for PaperBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperBank")
            .field("native", &self.native)
            .field("tokens", &self.tokens)
            .field("allowances", &self.allowances)
            .field("rejecting", &self.rejecting)
            .field("transfers", &self.transfers.len())
            .field("hooked", &self.on_payment.is_some())
            .finish()
    }
}

impl PaperBank {
    /// An empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Setup ──────────────────────────────────────────────────────────

    /// Credit native currency out of thin air.
    pub fn fund_native(&mut self, account: &AccountId, amount: Amount) {
        let balance = self.native.entry(account.clone()).or_default();
        *balance = Amount::new(balance.get().saturating_add(amount.get()));
    }

    /// Mint `amount` of `token` to `account`.
    pub fn mint(&mut self, token: &TokenRef, account: &AccountId, amount: Amount) {
        let balance = self
            .tokens
            .entry((token.clone(), account.clone()))
            .or_default();
        *balance = Amount::new(balance.get().saturating_add(amount.get()));
    }

    /// Set `spender`'s allowance over `owner`'s `token`, replacing any
    /// previous allowance.
    pub fn approve(
        &mut self,
        token: &TokenRef,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) {
        self.allowances
            .insert((token.clone(), owner.clone(), spender.clone()), amount);
    }

    /// Refuse every future payment to `account`.
    pub fn reject_payments_to(&mut self, account: &AccountId) {
        self.rejecting.insert(account.clone());
    }

    /// Accept payments to `account` again.
    pub fn accept_payments_to(&mut self, account: &AccountId) {
        self.rejecting.remove(account);
    }

    /// Install a callback run after every successful movement. While the
    /// callback runs it is detached, so movements it triggers do not
    /// re-invoke it.
    pub fn on_payment(&mut self, hook: impl FnMut(&mut PaperBank, &TransferRecord) + 'static) {
        self.on_payment = Some(Box::new(hook));
    }

    /// Remove the payment callback.
    pub fn clear_hook(&mut self) {
        self.on_payment = None;
    }

    // ── Queries ────────────────────────────────────────────────────────

    /// Native balance of `account`.
    pub fn balance(&self, account: &AccountId) -> Amount {
        self.native.get(account).copied().unwrap_or(Amount::ZERO)
    }

    /// `token` balance of `account`.
    pub fn token_balance(&self, token: &TokenRef, account: &AccountId) -> Amount {
        self.tokens
            .get(&(token.clone(), account.clone()))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// Balance of `asset` held by `account`.
    pub fn holdings(&self, asset: &Asset, account: &AccountId) -> Amount {
        match asset {
            Asset::Native => self.balance(account),
            Asset::Token(token) => self.token_balance(token, account),
        }
    }

    /// Sum of all balances of `asset`.
    pub fn total_supply(&self, asset: &Asset) -> u128 {
        match asset {
            Asset::Native => self.native.values().map(|a| u128::from(a.get())).sum(),
            Asset::Token(token) => self
                .tokens
                .iter()
                .filter(|((t, _), _)| t == token)
                .map(|(_, a)| u128::from(a.get()))
                .sum(),
        }
    }

    /// Every successful movement, oldest first.
    pub fn transfers(&self) -> &[TransferRecord] {
        &self.transfers
    }

    // ── Movement ───────────────────────────────────────────────────────

    fn settle(&mut self, record: TransferRecord) -> Result<(), TransferError> {
        if self.rejecting.contains(&record.to) {
            tracing::debug!(to = %record.to, asset = %record.asset, "paper bank refused payment");
            return Err(TransferError::Rejected {
                recipient: record.to.clone(),
                reason: "recipient refuses payment".to_string(),
            });
        }

        let available = self.holdings(&record.asset, &record.from);
        let debited = available
            .checked_sub(record.amount)
            .ok_or_else(|| TransferError::InsufficientFunds {
                account: record.from.clone(),
                required: record.amount,
                available,
            })?;
        // Self-transfers leave the balance unchanged.
        if record.from != record.to {
            let credited = self
                .holdings(&record.asset, &record.to)
                .checked_add(record.amount)
                .ok_or_else(|| TransferError::Overflow {
                    account: record.to.clone(),
                })?;
            self.set_holdings(&record.asset, &record.from, debited);
            self.set_holdings(&record.asset, &record.to, credited);
        }

        tracing::trace!(
            asset = %record.asset,
            from = %record.from,
            to = %record.to,
            amount = %record.amount,
            "paper bank transfer"
        );
        self.transfers.push(record.clone());

        if let Some(mut hook) = self.on_payment.take() {
            hook(self, &record);
            if self.on_payment.is_none() {
                self.on_payment = Some(hook);
            }
        }
        Ok(())
    }

    fn set_holdings(&mut self, asset: &Asset, account: &AccountId, amount: Amount) {
        match asset {
            Asset::Native => {
                self.native.insert(account.clone(), amount);
            }
            Asset::Token(token) => {
                self.tokens.insert((token.clone(), account.clone()), amount);
            }
        }
    }
}

impl NativeRail for PaperBank {
    fn pay(&mut self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<(), TransferError> {
        self.settle(TransferRecord {
            asset: Asset::Native,
            from: from.clone(),
            to: to.clone(),
            amount,
        })
    }
}

impl TokenRail for PaperBank {
    fn allowance(&self, token: &TokenRef, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances
            .get(&(token.clone(), owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    fn transfer_from(
        &mut self,
        token: &TokenRef,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        let key = (token.clone(), from.clone(), spender.clone());
        let available = self.allowances.get(&key).copied().unwrap_or(Amount::ZERO);
        let remaining =
            available
                .checked_sub(amount)
                .ok_or_else(|| TransferError::AllowanceExceeded {
                    owner: from.clone(),
                    spender: spender.clone(),
                    required: amount,
                    available,
                })?;
        // Spend the allowance first so a hook re-entering the rails sees it.
        self.allowances.insert(key.clone(), remaining);
        let moved = self.settle(TransferRecord {
            asset: Asset::Token(token.clone()),
            from: from.clone(),
            to: to.clone(),
            amount,
        });
        if moved.is_err() {
            self.allowances.insert(key, available);
        }
        moved
    }

    fn transfer(
        &mut self,
        token: &TokenRef,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        self.settle(TransferRecord {
            asset: Asset::Token(token.clone()),
            from: from.clone(),
            to: to.clone(),
            amount,
        })
    }
}
