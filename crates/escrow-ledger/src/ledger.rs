//! # Escrow Ledger
//!
//! [`EscrowLedger`] is the single authority over sale records, the custody
//! book and the audit trail. All state sits behind one `parking_lot::Mutex`;
//! methods take `&self` so the ledger can be shared.
//!
//! ## Call Sequence
//!
//! Every mutating call validates, mutates, then moves value. The lock is
//! never held while a value rail runs, because a rail may call back into
//! the ledger.
//!
//! - **Create**: validate terms, take the deposit into custody, then open
//!   the record under the lock. The id is allocated at insertion, so a
//!   failed deposit never advances the counter. If the record cannot be
//!   opened after the deposit moved, the deposit is refunded.
//! - **Complete / cancel / resolve**: under the lock, mark the new status,
//!   release the custody book entry and prepare the audit entry. Then
//!   release the value. A re-entrant call on the same sale sees the new
//!   terminal status. If the release fails, status and custody book are
//!   restored and the event is never appended.
//! - **Raise dispute**: no value moves; one lock section.

use parking_lot::Mutex;

use escrow_core::{AccountId, Amount, SaleId};

use crate::audit::{AuditEntry, AuditError, AuditTrail};
use crate::config::{ConfigError, LedgerConfig};
use crate::custody::{CustodyBook, ValueRails};
use crate::error::LedgerError;
use crate::event::SaleEvent;
use crate::sale::{Asset, Operation, Sale, SaleTerms, Settlement};
use crate::store::SaleStore;

/// The invoking account and the native value attached to the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Who is calling.
    pub caller: AccountId,
    /// Native value sent along with the call.
    pub attached: Amount,
}

impl CallContext {
    /// A call carrying no value.
    pub fn new(caller: AccountId) -> Self {
        Self {
            caller,
            attached: Amount::ZERO,
        }
    }

    /// Attach native value to the call.
    pub fn with_value(mut self, amount: Amount) -> Self {
        self.attached = amount;
        self
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    sales: SaleStore,
    custody: CustodyBook,
    audit: AuditTrail,
}

/// The escrow ledger.
#[derive(Debug)]
pub struct EscrowLedger {
    config: LedgerConfig,
    state: Mutex<LedgerState>,
}

impl EscrowLedger {
    /// An empty ledger.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config does not validate.
    pub fn new(config: LedgerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        tracing::info!(
            custody_account = %config.custody_account,
            administrator = %config.administrator,
            "escrow ledger initialized"
        );
        Ok(Self {
            config,
            state: Mutex::new(LedgerState::default()),
        })
    }

    /// The deployed configuration.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// The administrator. Has no power over sales.
    pub fn administrator(&self) -> &AccountId {
        &self.config.administrator
    }

    /// The vault account that holds custodied value on the rails.
    pub fn custody_account(&self) -> &AccountId {
        &self.config.custody_account
    }

    // ── Mutations ──────────────────────────────────────────────────────

    /// Open a sale from the caller (buyer) to `seller` and take `amount` of
    /// `asset` into custody.
    ///
    /// Native sales require `call.attached == amount`. Token sales pull the
    /// amount through an allowance the buyer granted to the custody account
    /// and must carry no native value.
    ///
    /// # Errors
    ///
    /// Validation errors for same party, the custody account as buyer or
    /// seller, zero amount or a mismatched deposit; [`LedgerError::Custody`] if the allowance is short or the
    /// pull fails. On error nothing changed and the id counter did not
    /// advance.
    pub fn create_sale<R: ValueRails + ?Sized>(
        &self,
        rails: &mut R,
        call: &CallContext,
        seller: AccountId,
        amount: Amount,
        asset: Asset,
    ) -> Result<SaleId, LedgerError> {
        let terms = SaleTerms {
            buyer: call.caller.clone(),
            seller,
            amount,
            asset,
        };
        terms
            .validate()
            .and_then(|()| self.check_outside_custody(&terms))
            .map_err(|err| rejected(Operation::Create, err))?;
        self.state
            .lock()
            .sales
            .next_id()
            .map_err(|err| rejected(Operation::Create, err))?;

        terms
            .asset
            .custody(rails, &self.config.custody_account, call.attached)
            .debit(&terms.buyer, terms.amount)
            .map_err(|source| {
                rejected(
                    Operation::Create,
                    LedgerError::custody(Operation::Create, source),
                )
            })?;

        let opened = {
            let mut guard = self.state.lock();
            open_sale(&mut guard, terms.clone())
        };
        match opened {
            Ok(entry) => {
                tracing::info!(
                    sale_id = %entry.event.sale_id(),
                    buyer = %terms.buyer,
                    seller = %terms.seller,
                    amount = %terms.amount,
                    asset = %terms.asset,
                    sequence = entry.sequence,
                    "sale created"
                );
                Ok(entry.event.sale_id())
            }
            Err(err) => {
                let refund = terms
                    .asset
                    .custody(rails, &self.config.custody_account, Amount::ZERO)
                    .credit(&terms.buyer, terms.amount);
                match refund {
                    Ok(()) => tracing::warn!(
                        buyer = %terms.buyer,
                        amount = %terms.amount,
                        asset = %terms.asset,
                        error = %err,
                        "sale could not be opened, deposit refunded"
                    ),
                    Err(refund_err) => tracing::error!(
                        buyer = %terms.buyer,
                        amount = %terms.amount,
                        asset = %terms.asset,
                        error = %err,
                        refund_error = %refund_err,
                        "sale could not be opened and deposit refund failed"
                    ),
                }
                Err(err)
            }
        }
    }

    /// The custody account can neither deposit into nor be paid out of its
    /// own custody.
    fn check_outside_custody(&self, terms: &SaleTerms) -> Result<(), LedgerError> {
        let vault = &self.config.custody_account;
        for (party, role) in [(&terms.buyer, "buyer"), (&terms.seller, "seller")] {
            if party == vault {
                return Err(LedgerError::CustodyAccountAsParty {
                    account: vault.clone(),
                    role,
                });
            }
        }
        Ok(())
    }

    /// Release the sale's value to the seller. Caller must be the buyer or
    /// the seller; the sale must be `Pending`.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Authorization`, `InvalidState`, or `Custody` if the
    /// transfer to the seller fails (the sale stays `Pending`).
    pub fn complete_sale<R: ValueRails + ?Sized>(
        &self,
        rails: &mut R,
        sale_id: SaleId,
        caller: &AccountId,
    ) -> Result<(), LedgerError> {
        self.settle(rails, Operation::Complete, sale_id, |sale| {
            sale.complete(caller)
        })
    }

    /// Refund the sale's value to the buyer. Same rules as
    /// [`EscrowLedger::complete_sale`].
    ///
    /// # Errors
    ///
    /// As for [`EscrowLedger::complete_sale`].
    pub fn cancel_sale<R: ValueRails + ?Sized>(
        &self,
        rails: &mut R,
        sale_id: SaleId,
        caller: &AccountId,
    ) -> Result<(), LedgerError> {
        self.settle(rails, Operation::Cancel, sale_id, |sale| sale.cancel(caller))
    }

    /// Freeze a `Pending` sale and name its arbiter. Caller must be the
    /// buyer or the seller. No value moves.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Authorization` or `InvalidState`.
    pub fn raise_dispute(
        &self,
        sale_id: SaleId,
        caller: &AccountId,
        arbiter: AccountId,
    ) -> Result<(), LedgerError> {
        let operation = Operation::RaiseDispute;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let sale = state
            .sales
            .require_mut(sale_id)
            .map_err(|err| rejected(operation, err))?;
        let snapshot = sale.clone();
        let event = sale
            .raise_dispute(caller, arbiter)
            .map_err(|err| rejected(operation, err))?;
        let prepared = match state.audit.prepare(event) {
            Ok(prepared) => prepared,
            Err(err) => {
                *sale = snapshot;
                return Err(rejected(operation, err.into()));
            }
        };
        let arbiter = sale.arbiter.clone();
        let entry = state.audit.append(prepared);
        tracing::info!(
            sale_id = %sale_id,
            caller = %caller,
            arbiter = ?arbiter.as_ref().map(AccountId::as_str),
            sequence = entry.sequence,
            "sale disputed"
        );
        Ok(())
    }

    /// Award a `Disputed` sale's value to `winner`. Only the stored arbiter
    /// may call; `winner` must be the buyer or the seller.
    ///
    /// # Errors
    ///
    /// `NotFound`; `InvalidState` unless `Disputed` (checked first, so a
    /// second resolution fails this way for every caller); `Authorization`
    /// unless the caller is the arbiter; `InvalidWinner`; `Custody` if the
    /// transfer fails (the sale stays `Disputed`).
    pub fn resolve_dispute<R: ValueRails + ?Sized>(
        &self,
        rails: &mut R,
        sale_id: SaleId,
        caller: &AccountId,
        winner: &AccountId,
    ) -> Result<(), LedgerError> {
        self.settle(rails, Operation::ResolveDispute, sale_id, |sale| {
            sale.resolve(caller, winner)
        })
    }

    /// Mark a value-releasing transition, release the value, and commit or
    /// roll back.
    fn settle<R, F>(
        &self,
        rails: &mut R,
        operation: Operation,
        sale_id: SaleId,
        transition: F,
    ) -> Result<(), LedgerError>
    where
        R: ValueRails + ?Sized,
        F: FnOnce(&mut Sale) -> Result<Settlement, LedgerError>,
    {
        let (settlement, prepared) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let sale = state
                .sales
                .require_mut(sale_id)
                .map_err(|err| rejected(operation, err))?;
            let settlement = transition(sale).map_err(|err| rejected(operation, err))?;
            let staged = state
                .audit
                .prepare(settlement.event.clone())
                .map_err(LedgerError::from)
                .and_then(|prepared| {
                    state
                        .custody
                        .release(&settlement.asset, settlement.amount)
                        .map(|()| prepared)
                        .map_err(|source| LedgerError::custody(operation, source))
                });
            match staged {
                Ok(prepared) => (settlement, prepared),
                Err(err) => {
                    sale.revert(&settlement);
                    return Err(rejected(operation, err));
                }
            }
        };

        let released = settlement
            .asset
            .custody(rails, &self.config.custody_account, Amount::ZERO)
            .credit(&settlement.recipient, settlement.amount);

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Err(source) = released {
            if let Ok(sale) = state.sales.require_mut(sale_id) {
                sale.revert(&settlement);
            }
            if let Err(err) = state.custody.hold(&settlement.asset, settlement.amount) {
                tracing::error!(
                    sale_id = %sale_id,
                    error = %err,
                    "custody book could not be restored"
                );
            }
            tracing::warn!(
                sale_id = %sale_id,
                operation = %operation,
                recipient = %settlement.recipient,
                amount = %settlement.amount,
                asset = %settlement.asset,
                error = %source,
                "value release failed, transition rolled back"
            );
            return Err(LedgerError::custody(operation, source));
        }

        let entry = state.audit.append(prepared);
        tracing::info!(
            sale_id = %sale_id,
            operation = %operation,
            recipient = %settlement.recipient,
            amount = %settlement.amount,
            asset = %settlement.asset,
            event = %settlement.event,
            sequence = entry.sequence,
            "sale settled"
        );
        Ok(())
    }

    // ── Reads ──────────────────────────────────────────────────────────

    /// The full record of a sale.
    pub fn get_sale(&self, sale_id: SaleId) -> Option<Sale> {
        self.state.lock().sales.get(sale_id).cloned()
    }

    /// Number of sales ever created.
    pub fn sale_count(&self) -> usize {
        self.state.lock().sales.len()
    }

    /// The id the next created sale will receive, if any remain.
    pub fn next_sale_id(&self) -> Option<SaleId> {
        self.state.lock().sales.next_id().ok()
    }

    /// Value of `asset` currently held in custody.
    pub fn custody_held(&self, asset: &Asset) -> Amount {
        self.state.lock().custody.held(asset)
    }

    /// Sales in which `account` is buyer, seller or arbiter, in id order.
    pub fn sales_for(&self, account: &AccountId) -> Vec<Sale> {
        self.state
            .lock()
            .sales
            .iter()
            .filter(|sale| sale.involves(account))
            .cloned()
            .collect()
    }

    /// Every emitted event, oldest first.
    pub fn events(&self) -> Vec<SaleEvent> {
        self.state
            .lock()
            .audit
            .entries()
            .iter()
            .map(|entry| entry.event.clone())
            .collect()
    }

    /// A copy of the audit trail entries, oldest first.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.lock().audit.entries().to_vec()
    }

    /// Recompute the audit hash chain.
    ///
    /// # Errors
    ///
    /// The first [`AuditError`] found.
    pub fn verify_audit(&self) -> Result<(), AuditError> {
        self.state.lock().audit.verify()
    }
}

/// Record a freshly deposited sale. Runs under the lock.
fn open_sale(state: &mut LedgerState, terms: SaleTerms) -> Result<AuditEntry, LedgerError> {
    let sale_id = state.sales.next_id()?;
    let prepared = state.audit.prepare(SaleEvent::SaleCreated {
        sale_id,
        buyer: terms.buyer.clone(),
        seller: terms.seller.clone(),
        amount: terms.amount,
        asset: terms.asset.clone(),
    })?;
    state
        .custody
        .hold(&terms.asset, terms.amount)
        .map_err(|source| LedgerError::custody(Operation::Create, source))?;
    let (asset, amount) = (terms.asset.clone(), terms.amount);
    if let Err(err) = state.sales.insert(terms) {
        if let Err(release_err) = state.custody.release(&asset, amount) {
            tracing::error!(error = %release_err, "custody book could not be restored");
        }
        return Err(err);
    }
    Ok(state.audit.append(prepared).clone())
}

fn rejected(operation: Operation, err: LedgerError) -> LedgerError {
    tracing::debug!(
        operation = %operation,
        kind = ?err.kind(),
        error = %err,
        "ledger call rejected"
    );
    err
}
