//! # Hostile and Failing Value Rails
//!
//! The ledger must stay consistent when a rail refuses a payment or calls
//! back into the ledger while a payment is in flight:
//! - a refused release rolls the whole transition back
//! - a re-entrant call on a sale being settled sees its new status
//! - repeating a settlement never pays twice

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use common::{account, usdc, vault, Harness};
use escrow_core::{Amount, SaleId};
use escrow_ledger::{
    Asset, CallContext, CustodyError, ErrorKind, EscrowLedger, LedgerError, SaleStatus,
    TransferError,
};

type Outcomes = Rc<RefCell<Vec<Result<(), ErrorKind>>>>;

fn outcomes() -> Outcomes {
    Rc::new(RefCell::new(Vec::new()))
}

// ---------------------------------------------------------------------------
// Refused payments
// ---------------------------------------------------------------------------

#[test]
fn refused_completion_rolls_back() {
    let mut h = Harness::new();
    let id = h.native_sale("alice", "bob", 100);
    let before = h.ledger.get_sale(id).unwrap();
    h.bank.reject_payments_to(&account("bob"));

    let err = h
        .ledger
        .complete_sale(&mut h.bank, id, &account("alice"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Custody);
    assert!(matches!(
        err,
        LedgerError::Custody {
            source: CustodyError::Transfer(TransferError::Rejected { .. }),
            ..
        }
    ));
    assert_eq!(h.ledger.get_sale(id).unwrap(), before);
    assert_eq!(h.ledger.custody_held(&Asset::Native), Amount::new(100));
    assert_eq!(h.native("escrow-vault"), 100);
    assert_eq!(h.ledger.events().len(), 1);
    assert!(h.ledger.verify_audit().is_ok());

    // Once bob accepts payments again the same call succeeds.
    h.bank.accept_payments_to(&account("bob"));
    h.ledger
        .complete_sale(&mut h.bank, id, &account("alice"))
        .unwrap();
    assert_eq!(h.native("bob"), 1_100);
}

#[test]
fn refused_resolution_stays_disputed() {
    let mut h = Harness::new();
    let id = h.token_sale("alice", "bob", 100);
    h.ledger
        .raise_dispute(id, &account("alice"), account("xavier"))
        .unwrap();
    h.bank.reject_payments_to(&account("alice"));

    let err = h
        .ledger
        .resolve_dispute(&mut h.bank, id, &account("xavier"), &account("alice"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Custody);
    let sale = h.ledger.get_sale(id).unwrap();
    assert_eq!(sale.status, SaleStatus::Disputed);
    assert_eq!(sale.arbiter, Some(account("xavier")));
    assert_eq!(h.ledger.custody_held(&Asset::Token(usdc())), Amount::new(100));

    // The arbiter may pick the other party instead.
    h.ledger
        .resolve_dispute(&mut h.bank, id, &account("xavier"), &account("bob"))
        .unwrap();
    assert_eq!(h.tokens("bob"), 1_100);
}

#[test]
fn refused_deposit_leaves_counter() {
    let mut h = Harness::new();
    h.bank.reject_payments_to(&vault());
    let call = CallContext::new(account("alice")).with_value(Amount::new(100));
    let err = h
        .ledger
        .create_sale(&mut h.bank, &call, account("bob"), Amount::new(100), Asset::Native)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Custody);
    assert_eq!(h.ledger.next_sale_id(), Some(SaleId::FIRST));
    assert_eq!(h.native("alice"), 1_000);
}

#[test]
fn custody_account_cannot_open_or_receive_a_sale() {
    let mut h = Harness::new();
    let honest = h.native_sale("alice", "bob", 100);
    let transfers = h.bank.transfers().len();

    // The vault tries to re-deposit value it already holds for sale 1.
    let from_vault = CallContext::new(vault()).with_value(Amount::new(100));
    let err = h
        .ledger
        .create_sale(&mut h.bank, &from_vault, account("mallory"), Amount::new(100), Asset::Native)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(matches!(
        err,
        LedgerError::CustodyAccountAsParty { role: "buyer", .. }
    ));

    // Nobody can sell to the vault either, for either asset.
    let to_vault = CallContext::new(account("alice")).with_value(Amount::new(100));
    let err = h
        .ledger
        .create_sale(&mut h.bank, &to_vault, vault(), Amount::new(100), Asset::Native)
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::CustodyAccountAsParty { role: "seller", .. }
    ));
    h.bank
        .approve(&usdc(), &account("alice"), &vault(), Amount::new(100));
    let err = h
        .ledger
        .create_sale(
            &mut h.bank,
            &CallContext::new(account("alice")),
            vault(),
            Amount::new(100),
            Asset::Token(usdc()),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert_eq!(h.bank.transfers().len(), transfers);
    assert_eq!(h.ledger.next_sale_id(), SaleId::new(2).ok());
    assert_eq!(h.ledger.custody_held(&Asset::Native), Amount::new(100));
    assert_eq!(h.ledger.custody_held(&Asset::Token(usdc())), Amount::ZERO);
    assert_eq!(h.ledger.events().len(), 1);

    // The honest sale still settles in full.
    h.ledger
        .complete_sale(&mut h.bank, honest, &account("alice"))
        .unwrap();
    assert_eq!(h.native("bob"), 1_100);
    assert_eq!(h.native("escrow-vault"), 0);
}

// ---------------------------------------------------------------------------
// Idempotence of failure
// ---------------------------------------------------------------------------

#[test]
fn repeated_settlement_pays_once() {
    let mut h = Harness::new();
    let completed = h.native_sale("alice", "bob", 100);
    let cancelled = h.native_sale("alice", "bob", 50);

    h.ledger
        .complete_sale(&mut h.bank, completed, &account("alice"))
        .unwrap();
    h.ledger
        .cancel_sale(&mut h.bank, cancelled, &account("bob"))
        .unwrap();
    let transfers = h.bank.transfers().len();

    for caller in ["alice", "bob"] {
        for id in [completed, cancelled] {
            let complete = h.ledger.complete_sale(&mut h.bank, id, &account(caller));
            let cancel = h.ledger.cancel_sale(&mut h.bank, id, &account(caller));
            assert_eq!(complete.unwrap_err().kind(), ErrorKind::InvalidState);
            assert_eq!(cancel.unwrap_err().kind(), ErrorKind::InvalidState);
        }
    }
    assert_eq!(h.bank.transfers().len(), transfers);
    assert_eq!(h.native("bob"), 1_100);
    assert_eq!(h.native("alice"), 900);
}

// ---------------------------------------------------------------------------
// Re-entrancy
// ---------------------------------------------------------------------------

/// When the seller is paid, the seller immediately tries to be paid again.
#[test]
fn reentrant_completion_is_rejected() {
    let mut h = Harness::new();
    let id = h.native_sale("alice", "bob", 100);
    let seen = outcomes();

    let ledger: Arc<EscrowLedger> = Arc::clone(&h.ledger);
    let log = Rc::clone(&seen);
    h.bank.on_payment(move |bank, record| {
        if record.to == account("bob") {
            let again = ledger.complete_sale(bank, id, &account("bob"));
            let refund = ledger.cancel_sale(bank, id, &account("bob"));
            log.borrow_mut().push(again.map_err(|e| e.kind()));
            log.borrow_mut().push(refund.map_err(|e| e.kind()));
        }
    });

    h.ledger
        .complete_sale(&mut h.bank, id, &account("alice"))
        .unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![Err(ErrorKind::InvalidState), Err(ErrorKind::InvalidState)]
    );
    assert_eq!(h.native("bob"), 1_100);
    assert_eq!(h.native("escrow-vault"), 0);
    assert_eq!(h.ledger.custody_held(&Asset::Native), Amount::ZERO);
}

/// The winner of a dispute tries to have it resolved a second time.
#[test]
fn reentrant_resolution_is_rejected() {
    let mut h = Harness::new();
    let id = h.native_sale("alice", "bob", 100);
    // alice names herself arbiter; the ledger allows it.
    h.ledger
        .raise_dispute(id, &account("alice"), account("alice"))
        .unwrap();
    let seen = outcomes();

    let ledger = Arc::clone(&h.ledger);
    let log = Rc::clone(&seen);
    h.bank.on_payment(move |bank, record| {
        if record.to == account("alice") {
            let again = ledger.resolve_dispute(bank, id, &account("alice"), &account("alice"));
            log.borrow_mut().push(again.map_err(|e| e.kind()));
        }
    });

    h.ledger
        .resolve_dispute(&mut h.bank, id, &account("alice"), &account("alice"))
        .unwrap();
    assert_eq!(*seen.borrow(), vec![Err(ErrorKind::InvalidState)]);
    assert_eq!(h.native("alice"), 1_000);
}

/// While alice's deposit is in flight, the vault-side hook opens another
/// sale. Both sales get distinct ids and both deposits are accounted for.
#[test]
fn reentrant_creation_gets_distinct_id() {
    let mut h = Harness::new();
    let nested = Rc::new(RefCell::new(None));

    let ledger = Arc::clone(&h.ledger);
    let slot = Rc::clone(&nested);
    h.bank.on_payment(move |bank, record| {
        if record.from == account("alice") && slot.borrow().is_none() {
            let call = CallContext::new(account("bob")).with_value(Amount::new(30));
            let id = ledger.create_sale(
                bank,
                &call,
                account("alice"),
                Amount::new(30),
                Asset::Native,
            );
            *slot.borrow_mut() = Some(id.map_err(|e| e.kind()));
        }
    });

    let outer = h.native_sale("alice", "bob", 100);
    let inner = nested.borrow().clone().unwrap().unwrap();

    assert_ne!(outer, inner);
    assert_eq!(inner, SaleId::FIRST);
    assert_eq!(outer.get(), 2);
    assert_eq!(h.ledger.custody_held(&Asset::Native), Amount::new(130));
    assert_eq!(h.native("escrow-vault"), 130);
    assert_eq!(h.ledger.get_sale(outer).unwrap().amount, Amount::new(100));
    assert_eq!(h.ledger.get_sale(inner).unwrap().amount, Amount::new(30));
    assert!(h.ledger.verify_audit().is_ok());
}

/// A re-entrant call that fails does not disturb the outer settlement, and a
/// re-entrant call on a different sale proceeds normally.
#[test]
fn reentrant_call_on_other_sale_succeeds() {
    let mut h = Harness::new();
    let first = h.native_sale("alice", "bob", 100);
    let second = h.native_sale("alice", "bob", 40);
    let seen = outcomes();

    let ledger = Arc::clone(&h.ledger);
    let log = Rc::clone(&seen);
    h.bank.on_payment(move |bank, record| {
        if record.to == account("bob") {
            let other = ledger.complete_sale(bank, second, &account("bob"));
            log.borrow_mut().push(other.map_err(|e| e.kind()));
        }
    });

    h.ledger
        .complete_sale(&mut h.bank, first, &account("alice"))
        .unwrap();
    assert_eq!(*seen.borrow(), vec![Ok(())]);
    assert_eq!(h.ledger.get_sale(first).unwrap().status, SaleStatus::Completed);
    assert_eq!(h.ledger.get_sale(second).unwrap().status, SaleStatus::Completed);
    assert_eq!(h.native("bob"), 1_140);
    assert_eq!(h.ledger.custody_held(&Asset::Native), Amount::ZERO);
    assert!(h.ledger.verify_audit().is_ok());
}
