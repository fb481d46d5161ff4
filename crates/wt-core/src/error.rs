//! Domain error types.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Event type name that no `EventKind` answers to
    #[error("Unknown event type: {0}")]
    UnknownEventKind(String),

    /// Day string that is not `YYYY-MM-DD`
    #[error("Invalid day '{value}' (expected YYYY-MM-DD)")]
    InvalidDay { value: String },

    /// Timestamp string in an unexpected format
    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
