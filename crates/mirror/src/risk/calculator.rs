//! Health and leverage of one aggregate view
//!
//! All amounts are converted to UI units (native / 10^decimals) and valued in
//! the shared quote token. Open orders and resting perp orders are valued as
//! if the worse side had fully executed. Every operation is checked; an
//! overflow yields `Undefined(Overflow)` instead of a wrapped number.

use super::snapshot::{
    Leverage, PositionKind, PositionValue, RiskSnapshot, UndefinedReason, Verdict,
};
use super::HealthType;
use crate::config::RiskConfig;
use crate::view::{participates, AggregateView};
use chrono::Utc;
use fixed::types::I80F48;
use margin_layout::units::native_to_ui;
use margin_layout::{
    OpenOrders, PerpAccount, PerpMarket, PerpMarketInfo, SpotMarketInfo, MAX_PAIRS, QUOTE_INDEX,
};

type Calc<T> = Result<T, UndefinedReason>;

fn checked(value: Option<I80F48>) -> Calc<I80F48> {
    value.ok_or(UndefinedReason::Overflow)
}

fn add(a: I80F48, b: I80F48) -> Calc<I80F48> {
    checked(a.checked_add(b))
}

fn sub(a: I80F48, b: I80F48) -> Calc<I80F48> {
    checked(a.checked_sub(b))
}

fn mul(a: I80F48, b: I80F48) -> Calc<I80F48> {
    checked(a.checked_mul(b))
}

fn div(a: I80F48, b: I80F48) -> Calc<I80F48> {
    checked(a.checked_div(b))
}

fn to_ui(native: I80F48, decimals: u8) -> Calc<I80F48> {
    checked(native_to_ui(native, decimals))
}

fn abs(value: I80F48) -> Calc<I80F48> {
    checked(value.checked_abs())
}

fn lots(value: i128) -> Calc<I80F48> {
    checked(I80F48::checked_from_num(value))
}

struct Weights {
    asset: I80F48,
    liab: I80F48,
}

impl Weights {
    fn spot(info: &SpotMarketInfo, health_type: HealthType) -> Self {
        if info.is_empty() {
            // no spot market: a balance here counts for nothing, a debt in full
            return Self {
                asset: I80F48::ZERO,
                liab: I80F48::ONE,
            };
        }
        match health_type {
            HealthType::Initial => Self {
                asset: info.init_asset_weight,
                liab: info.init_liab_weight,
            },
            HealthType::Maintenance => Self {
                asset: info.maint_asset_weight,
                liab: info.maint_liab_weight,
            },
        }
    }

    fn perp(info: &PerpMarketInfo, health_type: HealthType) -> Self {
        match health_type {
            HealthType::Initial => Self {
                asset: info.init_asset_weight,
                liab: info.init_liab_weight,
            },
            HealthType::Maintenance => Self {
                asset: info.maint_asset_weight,
                liab: info.maint_liab_weight,
            },
        }
    }

    fn apply(&self, value: I80F48) -> Calc<I80F48> {
        if value >= I80F48::ZERO {
            mul(value, self.asset)
        } else {
            mul(value, self.liab)
        }
    }
}

#[derive(Default)]
struct Valuation {
    collateral: I80F48,
    liabilities: I80F48,
    positions: Vec<PositionValue>,
}

impl Valuation {
    fn push(&mut self, kind: PositionKind, index: usize, amount: I80F48, price: I80F48, weights: &Weights) -> Calc<()> {
        let value = mul(amount, price)?;
        let weighted = weights.apply(value)?;
        if weighted >= I80F48::ZERO {
            self.collateral = add(self.collateral, weighted)?;
        } else {
            self.liabilities = sub(self.liabilities, weighted)?;
        }
        self.positions.push(PositionValue {
            kind,
            index,
            amount,
            price,
            value,
            weighted,
        });
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RiskCalculator {
    health_type: HealthType,
    liquidation_threshold: I80F48,
}

impl RiskCalculator {
    pub fn new(health_type: HealthType, liquidation_threshold: I80F48) -> Self {
        Self {
            health_type,
            liquidation_threshold,
        }
    }

    pub fn from_config(config: &RiskConfig) -> Self {
        Self::new(config.health_type, config.liquidation_threshold)
    }

    pub fn health_type(&self) -> HealthType {
        self.health_type
    }

    /// Value `view`. Never fails; problems show up as `Undefined` leverage.
    pub fn evaluate(&self, view: &AggregateView) -> RiskSnapshot {
        let (valuation, leverage, verdict) = match self.value(view) {
            Ok(valuation) => {
                let leverage = leverage(valuation.collateral, valuation.liabilities);
                let verdict = self.verdict(valuation.collateral, valuation.liabilities);
                (valuation, leverage, verdict)
            }
            Err(reason) => (Valuation::default(), Leverage::Undefined(reason), Verdict::Indeterminate),
        };

        RiskSnapshot {
            margin_account: view.address(),
            slot_range: view.slot_range,
            health_type: self.health_type,
            collateral: valuation.collateral,
            liabilities: valuation.liabilities,
            health: valuation.collateral.saturating_sub(valuation.liabilities),
            leverage,
            verdict,
            positions: valuation.positions,
            computed_at: Utc::now(),
        }
    }

    fn verdict(&self, collateral: I80F48, liabilities: I80F48) -> Verdict {
        let Some(capacity) = collateral.checked_mul(self.liquidation_threshold) else {
            return Verdict::Indeterminate;
        };
        if liabilities > capacity {
            Verdict::Liquidatable {
                shortfall: liabilities.saturating_sub(capacity),
            }
        } else {
            Verdict::Safe {
                headroom: capacity.saturating_sub(liabilities),
            }
        }
    }

    fn value(&self, view: &AggregateView) -> Calc<Valuation> {
        let account = &view.margin_account.value;
        let group = &view.group.value;
        let quote_decimals = group.quote_token().decimals;

        let mut valuation = Valuation::default();
        let mut quote_pool = I80F48::ZERO;

        for index in 0..MAX_PAIRS {
            if !participates(account, index) {
                continue;
            }
            let price = self.price(view, index)?;
            let decimals = group.tokens[index].decimals;

            let mut base = self.net_balance(view, index, decimals)?;
            if let Some(open_orders) = view.open_orders.get(&index) {
                let (base_delta, quote) =
                    pessimistic_open_orders(&open_orders.value, price, decimals, quote_decimals)?;
                base = add(base, base_delta)?;
                quote_pool = add(quote_pool, quote)?;
            }
            if base != I80F48::ZERO {
                let weights = Weights::spot(&group.spot_markets[index], self.health_type);
                valuation.push(PositionKind::Spot, index, base, price, &weights)?;
            }

            if let Some(perp) = account.perp_account(index) {
                let market = view
                    .perp_markets
                    .get(&index)
                    .ok_or(UndefinedReason::IncompleteView)?;
                let info = &group.perp_markets[index];
                let (perp_base, perp_quote) =
                    pessimistic_perp(perp, &market.value, info, price, decimals, quote_decimals)?;
                quote_pool = add(quote_pool, perp_quote)?;
                let weights = Weights::perp(info, self.health_type);
                valuation.push(PositionKind::Perp, index, perp_base, price, &weights)?;
            }
        }

        let quote = add(self.net_balance(view, QUOTE_INDEX, quote_decimals)?, quote_pool)?;
        if quote != I80F48::ZERO {
            let unit = Weights {
                asset: I80F48::ONE,
                liab: I80F48::ONE,
            };
            valuation.push(PositionKind::Quote, QUOTE_INDEX, quote, I80F48::ONE, &unit)?;
        }

        Ok(valuation)
    }

    fn price(&self, view: &AggregateView, index: usize) -> Calc<I80F48> {
        let oracle = view
            .oracles
            .get(&index)
            .ok_or(UndefinedReason::NonPositivePrice)?;
        if !oracle.value.is_trading() {
            return Err(UndefinedReason::NonPositivePrice);
        }
        let price = checked(oracle.value.ui_price())?;
        if price <= I80F48::ZERO {
            return Err(UndefinedReason::NonPositivePrice);
        }
        Ok(price)
    }

    /// Deposits minus borrows in UI units, scaled by the root bank indexes
    fn net_balance(&self, view: &AggregateView, index: usize, decimals: u8) -> Calc<I80F48> {
        let account = &view.margin_account.value;
        if !account.has_balance(index) {
            return Ok(I80F48::ZERO);
        }
        let bank = view
            .root_banks
            .get(&index)
            .ok_or(UndefinedReason::IncompleteView)?;
        let deposits = mul(account.deposits[index], bank.value.deposit_index)?;
        let borrows = mul(account.borrows[index], bank.value.borrow_index)?;
        to_ui(sub(deposits, borrows)?, decimals)
    }
}

fn leverage(collateral: I80F48, liabilities: I80F48) -> Leverage {
    if liabilities == I80F48::ZERO {
        return Leverage::Defined(I80F48::ZERO);
    }
    if collateral <= I80F48::ZERO {
        return Leverage::Undefined(UndefinedReason::ZeroCollateral);
    }
    match liabilities.checked_div(collateral) {
        Some(value) => Leverage::Defined(value),
        None => Leverage::Undefined(UndefinedReason::Overflow),
    }
}

/// Base added and quote released by a serum open orders account, assuming
/// whichever side leaves the larger base exposure executes in full
fn pessimistic_open_orders(
    open_orders: &OpenOrders,
    price: I80F48,
    decimals: u8,
    quote_decimals: u8,
) -> Calc<(I80F48, I80F48)> {
    let base_free = to_ui(I80F48::from_num(open_orders.base_token_free), decimals)?;
    let base_total = to_ui(I80F48::from_num(open_orders.base_token_total), decimals)?;
    let base_locked = to_ui(I80F48::from_num(open_orders.base_locked()), decimals)?;
    let quote_free = to_ui(I80F48::from_num(open_orders.quote_token_free), quote_decimals)?;
    let quote_total = to_ui(I80F48::from_num(open_orders.quote_token_total), quote_decimals)?;
    let quote_locked = to_ui(I80F48::from_num(open_orders.quote_locked()), quote_decimals)?;

    let if_all_bids = add(div(quote_locked, price)?, base_total)?;
    let if_all_asks = base_free;

    if if_all_bids > if_all_asks {
        Ok((if_all_bids, quote_free))
    } else {
        Ok((if_all_asks, add(mul(base_locked, price)?, quote_total)?))
    }
}

/// Funding accrued since the position last settled, in native quote
fn unsettled_funding(perp: &PerpAccount, market: &PerpMarket) -> Calc<I80F48> {
    let position = lots(perp.base_position as i128)?;
    if perp.base_position > 0 {
        mul(sub(market.long_funding, perp.long_settled_funding)?, position)
    } else if perp.base_position < 0 {
        mul(sub(market.short_funding, perp.short_settled_funding)?, position)
    } else {
        Ok(I80F48::ZERO)
    }
}

/// Base exposure and quote balance of a perp position, assuming the resting
/// side that leaves the larger absolute exposure fills completely
fn pessimistic_perp(
    perp: &PerpAccount,
    market: &PerpMarket,
    info: &PerpMarketInfo,
    price: I80F48,
    decimals: u8,
    quote_decimals: u8,
) -> Calc<(I80F48, I80F48)> {
    let base_lot = I80F48::from_num(info.base_lot_size);
    let quote_lot = I80F48::from_num(info.quote_lot_size);

    let position = mul(lots(perp.base_position as i128 + perp.taker_base as i128)?, base_lot)?;
    let bids = mul(lots(perp.bids_quantity as i128)?, base_lot)?;
    let asks = mul(lots(perp.asks_quantity as i128)?, base_lot)?;

    let if_all_bids = to_ui(add(position, bids)?, decimals)?;
    let if_all_asks = to_ui(sub(position, asks)?, decimals)?;

    let taker_quote = mul(lots(perp.taker_quote as i128)?, quote_lot)?;
    let quote_native = add(sub(perp.quote_position, unsettled_funding(perp, market)?)?, taker_quote)?;
    let quote = to_ui(quote_native, quote_decimals)?;

    if abs(if_all_bids)? > abs(if_all_asks)? {
        let paid = mul(to_ui(bids, decimals)?, price)?;
        Ok((if_all_bids, sub(quote, paid)?))
    } else {
        let received = mul(to_ui(asks, decimals)?, price)?;
        Ok((if_all_asks, add(quote, received)?))
    }
}
