//! Tracing subscriber setup

use crate::config::LoggingConfig;
use crate::core::{MirrorError, MirrorResult};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Fails if a global subscriber is already installed, so embedding
/// applications that bring their own can skip this.
pub fn init_tracing(config: &LoggingConfig) -> MirrorResult<()> {
    let level: tracing::Level = config
        .level
        .parse()
        .map_err(|_| MirrorError::Configuration(format!("unknown log level {:?}", config.level)))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("margin_mirror={},margin_layout={}", level, level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| MirrorError::Configuration(format!("tracing init failed: {}", e)))
}
