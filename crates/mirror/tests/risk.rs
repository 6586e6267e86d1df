//! Valuation of composed views

mod common;

use anyhow::Result;
use common::{close, halted_oracle, oracle, test_config, Scenario, ONE, TOKEN_A, TOKEN_B};
use margin_mirror::margin_layout::{
    AccountFlags, DecodedEntity, Group, OpenOrders, PerpMarket, Pubkey, RootBank, I80F48,
};
use margin_mirror::{
    EntityRegistry, HealthType, Leverage, MarginMirror, RiskCalculator, RiskSnapshot,
    UndefinedReason, Verdict, ViewBuilder,
};
use proptest::prelude::*;
use std::sync::Arc;

struct Inputs {
    deposit_a: i64,
    borrow_b: i64,
    price_a: i64,
    price_b: i64,
    liab_weight_b: I80F48,
}

fn evaluate(scenario: &Scenario, inputs: &Inputs, health_type: HealthType) -> Result<RiskSnapshot> {
    let registry = Arc::new(EntityRegistry::default());
    let mut group = scenario.group_entity();
    group.spot_markets[TOKEN_B].maint_liab_weight = inputs.liab_weight_b;
    group.spot_markets[TOKEN_B].init_liab_weight = inputs.liab_weight_b;

    let entities: Vec<(Pubkey, DecodedEntity)> = vec![
        (scenario.group, group.into()),
        (
            scenario.margin_account,
            scenario.account_entity(inputs.deposit_a, inputs.borrow_b).into(),
        ),
        (scenario.bank_a, RootBank::default().into()),
        (scenario.bank_b, RootBank::default().into()),
        (scenario.oracle_a, oracle(inputs.price_a).into()),
        (scenario.oracle_b, oracle(inputs.price_b).into()),
    ];
    for (address, entity) in entities {
        registry.put(address, entity, 1);
    }

    let view = ViewBuilder::new(registry, 0).build(&scenario.margin_account)?;
    Ok(RiskCalculator::new(health_type, I80F48::ONE).evaluate(&view))
}

fn literal() -> Inputs {
    Inputs {
        deposit_a: 5,
        borrow_b: 3,
        price_a: 10,
        price_b: 2,
        liab_weight_b: I80F48::from_num(1.1),
    }
}

#[test]
fn test_literal_scenario() -> Result<()> {
    let scenario = Scenario::new();
    let snapshot = evaluate(&scenario, &literal(), HealthType::Maintenance)?;

    assert!(close(snapshot.collateral, 45.0));
    assert!(close(snapshot.liabilities, 6.6));
    let leverage = snapshot.leverage.value().expect("defined leverage");
    assert!((leverage.to_num::<f64>() - 0.1467).abs() < 1e-4);
    assert!(!snapshot.verdict.is_liquidatable());
    match snapshot.verdict {
        Verdict::Safe { headroom } => assert!(close(headroom, 38.4)),
        other => panic!("unexpected verdict {:?}", other),
    }
    Ok(())
}

#[test]
fn test_initial_weights_are_stricter() -> Result<()> {
    let scenario = Scenario::new();
    let maint = evaluate(&scenario, &literal(), HealthType::Maintenance)?;
    let init = evaluate(&scenario, &literal(), HealthType::Initial)?;

    // init asset weight 0.8
    assert!(close(init.collateral, 40.0));
    assert!(init.health < maint.health);
    Ok(())
}

#[test]
fn test_zero_collateral_is_undefined() -> Result<()> {
    let scenario = Scenario::new();
    let inputs = Inputs {
        deposit_a: 0,
        ..literal()
    };
    let snapshot = evaluate(&scenario, &inputs, HealthType::Maintenance)?;

    assert_eq!(snapshot.collateral, I80F48::ZERO);
    assert_eq!(snapshot.leverage, Leverage::Undefined(UndefinedReason::ZeroCollateral));
    assert!(snapshot.verdict.is_liquidatable());
    Ok(())
}

#[test]
fn test_halted_price_is_indeterminate() -> Result<()> {
    let scenario = Scenario::new();
    let registry = Arc::new(EntityRegistry::default());
    let entities: Vec<(Pubkey, DecodedEntity)> = vec![
        (scenario.group, scenario.group_entity().into()),
        (scenario.margin_account, scenario.account_entity(5, 3).into()),
        (scenario.bank_a, RootBank::default().into()),
        (scenario.bank_b, RootBank::default().into()),
        (scenario.oracle_a, oracle(10).into()),
        (scenario.oracle_b, halted_oracle(2).into()),
    ];
    for (address, entity) in entities {
        registry.put(address, entity, 1);
    }
    let view = ViewBuilder::new(registry, 0).build(&scenario.margin_account)?;
    let snapshot = RiskCalculator::new(HealthType::Maintenance, I80F48::ONE).evaluate(&view);

    assert_eq!(snapshot.leverage, Leverage::Undefined(UndefinedReason::NonPositivePrice));
    assert_eq!(snapshot.verdict, Verdict::Indeterminate);
    assert!(snapshot.to_json()?.contains("non_positive_price"));
    Ok(())
}

#[tokio::test]
async fn test_open_orders_and_perp_positions() -> Result<()> {
    let scenario = Scenario::new();
    let open_orders = Pubkey::new_unique();
    let perp_market = Pubkey::new_unique();

    let mut group: Group = scenario.group_entity();
    let info = &mut group.perp_markets[TOKEN_A];
    info.perp_market = perp_market;
    info.maint_asset_weight = I80F48::from_num(0.95);
    info.maint_liab_weight = I80F48::from_num(1.05);
    info.base_lot_size = 100;
    info.quote_lot_size = 10;

    let mut account = scenario.account_entity(5, 3);
    account.in_margin_basket[TOKEN_A] = true;
    account.spot_open_orders[TOKEN_A] = open_orders;
    // one whole A long, eight quote owed
    account.perp_accounts[TOKEN_A].base_position = 10_000;
    account.perp_accounts[TOKEN_A].quote_position = I80F48::from_num(-8 * ONE);

    scenario.ledger.set_account(scenario.group, group);
    scenario.ledger.set_account(scenario.margin_account, account);
    scenario.ledger.set_account(
        open_orders,
        OpenOrders {
            account_flags: AccountFlags(AccountFlags::INITIALIZED | AccountFlags::OPEN_ORDERS),
            base_token_free: ONE as u64,
            base_token_total: ONE as u64,
            ..OpenOrders::default()
        },
    );
    scenario.ledger.set_account(perp_market, PerpMarket::default());

    let mirror = MarginMirror::start(scenario.transport(), test_config()).await?;
    let view = mirror.load(&scenario.margin_account).await?;
    assert!(view.open_orders.contains_key(&TOKEN_A));
    assert!(view.perp_markets.contains_key(&TOKEN_A));

    let snapshot = mirror.calculator().evaluate(&view);
    // spot 6 A * 10 * 0.9 plus perp 1 A * 10 * 0.95
    assert!(close(snapshot.collateral, 63.5));
    // borrowed B plus the perp quote debt
    assert!(close(snapshot.liabilities, 14.6));

    mirror.shutdown().await;
    Ok(())
}

fn weight(percent: u32) -> I80F48 {
    I80F48::from_num(percent) / I80F48::from_num(100)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn leverage_grows_with_liability_weight(
        deposit_a in 1i64..100,
        borrow_b in 1i64..100,
        price_a in 1i64..100,
        price_b in 1i64..100,
        base in 100u32..200,
        bump in 0u32..100,
    ) {
        let scenario = Scenario::new();
        let mut inputs = Inputs { deposit_a, borrow_b, price_a, price_b, liab_weight_b: weight(base) };
        let before = evaluate(&scenario, &inputs, HealthType::Maintenance).unwrap();
        inputs.liab_weight_b = weight(base + bump);
        let after = evaluate(&scenario, &inputs, HealthType::Maintenance).unwrap();

        prop_assert!(after.leverage.value().unwrap() >= before.leverage.value().unwrap());
    }

    #[test]
    fn leverage_grows_as_collateral_price_falls(
        deposit_a in 1i64..100,
        borrow_b in 1i64..100,
        price_a in 2i64..100,
        price_b in 1i64..100,
        fall in 1i64..100,
    ) {
        let scenario = Scenario::new();
        let mut inputs = Inputs { deposit_a, borrow_b, price_a, price_b, liab_weight_b: weight(110) };
        let before = evaluate(&scenario, &inputs, HealthType::Maintenance).unwrap();
        inputs.price_a = (price_a - fall).max(1);
        let after = evaluate(&scenario, &inputs, HealthType::Maintenance).unwrap();

        prop_assert!(after.leverage.value().unwrap() >= before.leverage.value().unwrap());
    }
}
