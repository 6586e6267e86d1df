//! Risk calculator: pure valuation of an aggregate view

mod calculator;
mod snapshot;

pub use calculator::RiskCalculator;
pub use snapshot::*;

use serde::{Deserialize, Serialize};

/// Which weight set values the account
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HealthType {
    /// Weights gating new positions
    Initial,
    /// Weights gating liquidation
    #[default]
    Maintenance,
}
