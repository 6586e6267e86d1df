//! Centralized error types for the mirror

use super::types::{DependencyRole, Slot};
use margin_layout::{AccountKind, LayoutError, Pubkey};
use thiserror::Error;

/// Main mirror error type
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("Missing {role} dependency: {address}")]
    MissingDependency { address: Pubkey, role: DependencyRole },

    #[error("Stale composition: slots {min}..={max} exceed tolerance of {tolerance}")]
    StaleComposition { min: Slot, max: Slot, tolerance: u64 },

    #[error("Wrong entity type at {address}: expected {expected}, found {found}")]
    WrongEntityType {
        address: Pubkey,
        expected: AccountKind,
        found: AccountKind,
    },

    #[error("Transport disconnected: {0}")]
    Disconnected(String),

    #[error("Account not found: {address}")]
    AccountNotFound { address: Pubkey },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MirrorError {
    /// Only a disconnect forces the router into a full resync
    pub fn is_disconnect(&self) -> bool {
        matches!(self, MirrorError::Disconnected(_))
    }

    /// Composition failures that resolve themselves once more data arrives
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MirrorError::MissingDependency { .. } | MirrorError::StaleComposition { .. }
        )
    }
}

/// Result type alias for mirror operations
pub type MirrorResult<T> = Result<T, MirrorError>;

impl From<validator::ValidationErrors> for MirrorError {
    fn from(err: validator::ValidationErrors) -> Self {
        MirrorError::Configuration(err.to_string())
    }
}

impl From<toml::de::Error> for MirrorError {
    fn from(err: toml::de::Error) -> Self {
        MirrorError::Configuration(err.to_string())
    }
}

impl From<std::io::Error> for MirrorError {
    fn from(err: std::io::Error) -> Self {
        MirrorError::Configuration(err.to_string())
    }
}
