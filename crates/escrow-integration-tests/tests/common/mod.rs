//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use escrow_core::{AccountId, Amount, SaleId, TokenRef};
use escrow_ledger::{Asset, CallContext, EscrowLedger, LedgerConfig};
use escrow_testkit::PaperBank;
use tracing_subscriber::EnvFilter;

/// Route ledger logs to the test writer. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_target(false)
        .with_test_writer()
        .try_init();
}

pub fn account(name: &str) -> AccountId {
    AccountId::new(name).expect("test account id")
}

pub fn usdc() -> TokenRef {
    TokenRef::new("USDC").expect("test token ref")
}

pub fn vault() -> AccountId {
    account("escrow-vault")
}

pub fn admin() -> AccountId {
    account("ops-admin")
}

/// A ledger and a bank in which alice and bob each hold 1_000 native and
/// 1_000 USDC. No allowances are granted.
pub struct Harness {
    pub ledger: Arc<EscrowLedger>,
    pub bank: PaperBank,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        let ledger = EscrowLedger::new(LedgerConfig::new(vault(), admin())).expect("ledger");
        let mut bank = PaperBank::new();
        for name in ["alice", "bob"] {
            bank.fund_native(&account(name), Amount::new(1_000));
            bank.mint(&usdc(), &account(name), Amount::new(1_000));
        }
        Self {
            ledger: Arc::new(ledger),
            bank,
        }
    }

    /// `buyer` opens a native sale to `seller`, attaching exactly `amount`.
    pub fn native_sale(&mut self, buyer: &str, seller: &str, amount: u64) -> SaleId {
        let call = CallContext::new(account(buyer)).with_value(Amount::new(amount));
        self.ledger
            .create_sale(
                &mut self.bank,
                &call,
                account(seller),
                Amount::new(amount),
                Asset::Native,
            )
            .expect("native sale")
    }

    /// `buyer` approves the vault and opens a USDC sale to `seller`.
    pub fn token_sale(&mut self, buyer: &str, seller: &str, amount: u64) -> SaleId {
        self.bank
            .approve(&usdc(), &account(buyer), &vault(), Amount::new(amount));
        self.ledger
            .create_sale(
                &mut self.bank,
                &CallContext::new(account(buyer)),
                account(seller),
                Amount::new(amount),
                Asset::Token(usdc()),
            )
            .expect("token sale")
    }

    pub fn native(&self, name: &str) -> u64 {
        self.bank.balance(&account(name)).get()
    }

    pub fn tokens(&self, name: &str) -> u64 {
        self.bank.token_balance(&usdc(), &account(name)).get()
    }
}
