//! Error types for signal sources and storage.

use std::time::Duration;

use thiserror::Error;

/// Failure to query an OS signal source.
///
/// Never fatal: callers treat it as "unknown" for the current poll.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("failed to run `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("`{command}` exited with {status}")]
    Failed { command: String, status: String },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("unexpected output from `{command}`: {reason}")]
    Output { command: String, reason: String },
}

/// Failure to read from or write to a store.
///
/// Appends are best-effort: a failed append is logged and the event is lost.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("failed to open store: {0}")]
    Open(String),

    #[error("store query failed: {0}")]
    Query(String),

    #[error("corrupt row: {0}")]
    Decode(String),

    #[error("store unavailable")]
    Unavailable,

    #[error("storage task failed: {0}")]
    Task(String),
}

impl StorageError {
    pub fn query<E: std::fmt::Display>(err: E) -> Self {
        Self::Query(err.to_string())
    }

    pub fn decode<E: std::fmt::Display>(err: E) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_display() {
        let err = SourceError::Timeout {
            command: "last -x".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "`last -x` timed out after 5s");

        let err = SourceError::Failed {
            command: "loginctl".to_string(),
            status: "exit status: 1".to_string(),
        };
        assert!(err.to_string().contains("exit status: 1"));
    }

    #[test]
    fn test_storage_error_helpers() {
        let err = StorageError::query("database is locked");
        assert_eq!(err.to_string(), "store query failed: database is locked");
        assert!(matches!(StorageError::decode("bad"), StorageError::Decode(_)));
    }
}
