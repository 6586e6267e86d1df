//! Shared fixtures: a two-market group with one leveraged margin account

#![allow(dead_code)]

use margin_mirror::margin_layout::{
    Group, MarginAccount, OraclePrice, PriceStatus, Pubkey, RootBank, I80F48, QUOTE_INDEX,
};
use margin_mirror::{AccountTransport, InMemoryLedger, MirrorConfig, RiskSnapshot, RiskStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tokio_stream::StreamExt;

pub const TOKEN_A: usize = 0;
pub const TOKEN_B: usize = 1;
pub const DECIMALS: u8 = 6;
pub const ONE: i64 = 1_000_000;

/// Addresses of every account in the fixture
pub struct Scenario {
    pub ledger: Arc<InMemoryLedger>,
    pub group: Pubkey,
    pub margin_account: Pubkey,
    pub bank_a: Pubkey,
    pub bank_b: Pubkey,
    pub bank_quote: Pubkey,
    pub oracle_a: Pubkey,
    pub oracle_b: Pubkey,
}

impl Scenario {
    /// Publish the fixture to a fresh ledger: +5 A at 10, -3 B at 2
    pub fn new() -> Self {
        let scenario = Self {
            ledger: Arc::new(InMemoryLedger::new()),
            group: Pubkey::new_unique(),
            margin_account: Pubkey::new_unique(),
            bank_a: Pubkey::new_unique(),
            bank_b: Pubkey::new_unique(),
            bank_quote: Pubkey::new_unique(),
            oracle_a: Pubkey::new_unique(),
            oracle_b: Pubkey::new_unique(),
        };
        scenario.publish_all();
        scenario
    }

    pub fn transport(&self) -> Arc<dyn AccountTransport> {
        self.ledger.clone()
    }

    pub fn publish_all(&self) {
        self.ledger.set_account(self.group, self.group_entity());
        self.ledger.set_account(self.margin_account, self.account_entity(5, 3));
        self.ledger.set_account(self.bank_a, RootBank::default());
        self.ledger.set_account(self.bank_b, RootBank::default());
        self.ledger.set_account(self.bank_quote, RootBank::default());
        self.ledger.set_account(self.oracle_a, oracle(10));
        self.ledger.set_account(self.oracle_b, oracle(2));
    }

    pub fn group_entity(&self) -> Group {
        let mut group = Group {
            num_oracles: 2,
            ..Group::default()
        };
        for (index, bank) in [(TOKEN_A, self.bank_a), (TOKEN_B, self.bank_b), (QUOTE_INDEX, self.bank_quote)] {
            group.tokens[index].mint = Pubkey::new_unique();
            group.tokens[index].root_bank = bank;
            group.tokens[index].decimals = DECIMALS;
        }
        group.oracles[TOKEN_A] = self.oracle_a;
        group.oracles[TOKEN_B] = self.oracle_b;
        for index in [TOKEN_A, TOKEN_B] {
            let market = &mut group.spot_markets[index];
            market.spot_market = Pubkey::new_unique();
            market.maint_asset_weight = I80F48::from_num(0.9);
            market.init_asset_weight = I80F48::from_num(0.8);
            market.maint_liab_weight = I80F48::from_num(1.1);
            market.init_liab_weight = I80F48::from_num(1.2);
        }
        group
    }

    /// Holds `deposit_a` whole A and owes `borrow_b` whole B
    pub fn account_entity(&self, deposit_a: i64, borrow_b: i64) -> MarginAccount {
        let mut account = MarginAccount {
            group: self.group,
            owner: Pubkey::new_unique(),
            ..MarginAccount::default()
        };
        account.deposits[TOKEN_A] = I80F48::from_num(deposit_a * ONE);
        account.borrows[TOKEN_B] = I80F48::from_num(borrow_b * ONE);
        account
    }

    pub fn dependencies(&self) -> Vec<Pubkey> {
        vec![
            self.margin_account,
            self.group,
            self.bank_a,
            self.bank_b,
            self.oracle_a,
            self.oracle_b,
        ]
    }
}

/// A trading oracle quoting `price` whole quote per whole base
pub fn oracle(price: i64) -> OraclePrice {
    let mut oracle = OraclePrice {
        exponent: -6,
        ..OraclePrice::default()
    };
    oracle.aggregate.price = price * ONE;
    oracle.aggregate.status = PriceStatus::Trading;
    oracle
}

pub fn halted_oracle(price: i64) -> OraclePrice {
    let mut oracle = oracle(price);
    oracle.aggregate.status = PriceStatus::Halted;
    oracle
}

/// Fast timers so reconnects and coalescing settle quickly
pub fn test_config() -> MirrorConfig {
    let mut config = MirrorConfig::default();
    config.sync.coalescing_window_ms = 5;
    config.transport.reconnect_delay_ms = 10;
    config.transport.max_reconnect_attempts = 50;
    config
}

pub fn close(actual: I80F48, expected: f64) -> bool {
    (actual.to_num::<f64>() - expected).abs() < 1e-6
}

/// Poll `check` until it holds, failing the test after a few seconds
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn next_snapshot(stream: &mut RiskStream) -> Arc<RiskSnapshot> {
    timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("no snapshot within timeout")
        .expect("risk stream ended")
}

/// Whether the stream stays quiet for `millis`
pub async fn quiet_for(stream: &mut RiskStream, millis: u64) -> bool {
    timeout(Duration::from_millis(millis), stream.next()).await.is_err()
}
