//! Codec error types

use crate::kind::AccountKind;
use thiserror::Error;

/// Errors raised while decoding an account payload.
///
/// Both variants are per-record: a caller consuming a stream drops the
/// offending frame and carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Malformed {kind} layout: {reason}")]
    MalformedLayout { kind: AccountKind, reason: String },

    #[error("Unknown account type tag: {0}")]
    UnknownType(u8),
}

impl LayoutError {
    pub fn malformed(kind: AccountKind, reason: impl Into<String>) -> Self {
        LayoutError::MalformedLayout {
            kind,
            reason: reason.into(),
        }
    }

    /// Kind the failing payload was decoded as, if the tag was recognised
    pub fn kind(&self) -> Option<AccountKind> {
        match self {
            LayoutError::MalformedLayout { kind, .. } => Some(*kind),
            LayoutError::UnknownType(_) => None,
        }
    }
}

/// Result type alias for codec operations
pub type LayoutResult<T> = Result<T, LayoutError>;
