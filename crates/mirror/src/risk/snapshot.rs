//! Risk snapshot types

use super::HealthType;
use crate::core::{MirrorError, MirrorResult, SlotRange};
use chrono::{DateTime, Utc};
use fixed::types::I80F48;
use margin_layout::Pubkey;
use serde::Serialize;

/// Why leverage has no numeric value
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedReason {
    /// Liabilities against nothing
    ZeroCollateral,
    /// An oracle in use is not positive or not trading
    NonPositivePrice,
    Overflow,
    /// A dependency the account references is absent from the view
    IncompleteView,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Leverage {
    Defined(I80F48),
    Undefined(UndefinedReason),
}

impl Leverage {
    pub fn value(&self) -> Option<I80F48> {
        match self {
            Leverage::Defined(value) => Some(*value),
            Leverage::Undefined(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Safe { headroom: I80F48 },
    Liquidatable { shortfall: I80F48 },
    /// Valuation itself failed
    Indeterminate,
}

impl Verdict {
    pub fn is_liquidatable(&self) -> bool {
        matches!(self, Verdict::Liquidatable { .. })
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PositionKind {
    Spot,
    Perp,
    Quote,
}

/// One valued line of the breakdown
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PositionValue {
    pub kind: PositionKind,
    /// Token index for spot and quote rows, market index for perp rows
    pub index: usize,
    /// Signed amount in UI units
    pub amount: I80F48,
    pub price: I80F48,
    /// `amount * price`
    pub value: I80F48,
    /// `value` after the asset or liability weight
    pub weighted: I80F48,
}

/// Solvency of one margin account as of a slot range. Replaced, never mutated.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RiskSnapshot {
    pub margin_account: Pubkey,
    pub slot_range: SlotRange,
    pub health_type: HealthType,
    pub collateral: I80F48,
    pub liabilities: I80F48,
    /// `collateral - liabilities`
    pub health: I80F48,
    pub leverage: Leverage,
    pub verdict: Verdict,
    pub positions: Vec<PositionValue>,
    pub computed_at: DateTime<Utc>,
}

impl RiskSnapshot {
    /// Equal in everything but the computation time
    pub fn same_state(&self, other: &RiskSnapshot) -> bool {
        self.margin_account == other.margin_account
            && self.slot_range == other.slot_range
            && self.health_type == other.health_type
            && self.collateral == other.collateral
            && self.liabilities == other.liabilities
            && self.health == other.health
            && self.leverage == other.leverage
            && self.verdict == other.verdict
            && self.positions == other.positions
    }

    pub fn to_json(&self) -> MirrorResult<String> {
        serde_json::to_string(self).map_err(|e| MirrorError::Other(e.into()))
    }
}
