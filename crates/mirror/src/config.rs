//! Configuration management for the margin mirror

use crate::core::{MirrorError, MirrorResult};
use crate::risk::HealthType;
use fixed::types::I80F48;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub sync: SyncConfig,
    pub transport: TransportConfig,
    pub risk: RiskConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SyncConfig {
    /// Largest slot spread tolerated inside one aggregate view
    #[validate(range(max = 10000))]
    pub staleness_tolerance_slots: u64,
    /// Updates within this window trigger a single recomputation
    #[validate(range(max = 60000))]
    pub coalescing_window_ms: u64,
    pub idle_policy: IdlePolicy,
    /// Capacity of the registry change broadcast
    #[validate(range(min = 16, max = 65536))]
    pub change_buffer: usize,
}

/// When an address no watched account references is released
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IdlePolicy {
    /// Keep every subscription until shutdown
    Never,
    /// Release as soon as the last reference goes
    Immediate,
    /// Release after the address stays unreferenced this long
    AfterIdle { secs: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TransportConfig {
    #[validate(range(min = 1, max = 60000))]
    pub reconnect_delay_ms: u64,
    #[validate(range(min = 1, max = 1000))]
    pub max_reconnect_attempts: u32,
    #[validate(range(min = 1, max = 65536))]
    pub command_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub health_type: HealthType,
    /// Liquidatable once liabilities exceed collateral times this factor
    pub liquidation_threshold: I80F48,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            staleness_tolerance_slots: 0,
            coalescing_window_ms: 50,
            idle_policy: IdlePolicy::Immediate,
            change_buffer: 1024,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 500,
            max_reconnect_attempts: 10,
            command_buffer: 256,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            health_type: HealthType::Maintenance,
            liquidation_threshold: I80F48::ONE,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl SyncConfig {
    pub fn coalescing_window(&self) -> Duration {
        Duration::from_millis(self.coalescing_window_ms)
    }
}

impl TransportConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl MirrorConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> MirrorResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> MirrorResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> MirrorResult<()> {
        self.sync.validate()?;
        self.transport.validate()?;

        if self.risk.liquidation_threshold <= I80F48::ZERO {
            return Err(MirrorError::Configuration(
                "liquidation_threshold must be positive".to_string(),
            ));
        }
        if let IdlePolicy::AfterIdle { secs: 0 } = self.sync.idle_policy {
            return Err(MirrorError::Configuration(
                "after_idle needs a non-zero delay; use immediate instead".to_string(),
            ));
        }
        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(MirrorError::Configuration(format!(
                "unknown log level {:?}",
                self.logging.level
            )));
        }
        Ok(())
    }
}
