//! Unified error types for session storage operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::sync::LockContention;

/// Errors that can occur during session storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    // ========================================================================
    // Concurrency errors (any backend)
    // ========================================================================
    /// The per-row lock for an external id stayed held past the bounded
    /// wait. Retryable: the transport layer may redeliver the event.
    #[error("session row for external id {external_id:?} is contended (waited {waited_ms}ms)")]
    Contention { external_id: String, waited_ms: u64 },

    // ========================================================================
    // File-based backend errors
    // ========================================================================
    /// I/O failure reading or writing a session document.
    #[error("I/O error at {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A session document exists but does not parse.
    #[error("deserialization error at {path}: {message}")]
    FileDeserialization { path: PathBuf, message: String },

    // ========================================================================
    // Generic errors (any backend)
    // ========================================================================
    /// A session failed to serialize for storage.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No stored session carries the given id.
    #[error("session not found: {id}")]
    NotFound { id: String },
}

impl StoreError {
    // ========================================================================
    // Concurrency helpers
    // ========================================================================
    /// Create a row-contention error.
    pub fn contention(external_id: impl Into<String>, waited_ms: u64) -> Self {
        Self::Contention {
            external_id: external_id.into(),
            waited_ms,
        }
    }

    /// Whether the caller may retry the failing operation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention { .. })
    }

    // ========================================================================
    // File-based backend helpers
    // ========================================================================
    /// Wrap an I/O error with the document path it hit.
    pub fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileIo {
            path: path.into(),
            source,
        }
    }

    /// Wrap a parse failure with the document path it hit.
    pub fn file_deserialization(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::FileDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    // ========================================================================
    // Generic helpers (any backend)
    // ========================================================================
    /// Build a serialization error from any message.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Build a not-found error for a session id.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }
}

impl From<LockContention> for StoreError {
    fn from(e: LockContention) -> Self {
        Self::contention(e.key, e.waited_ms)
    }
}

/// Shorthand result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_contention_is_retryable() {
        assert!(StoreError::contention("4879", 5000).is_retryable());
        assert!(!StoreError::not_found("ussd_123").is_retryable());
        assert!(!StoreError::serialization("bad").is_retryable());
    }

    #[test]
    fn lock_contention_converts_with_context() {
        let err: StoreError = LockContention {
            key: "4879".to_string(),
            waited_ms: 250,
        }
        .into();

        match err {
            StoreError::Contention {
                external_id,
                waited_ms,
            } => {
                assert_eq!(external_id, "4879");
                assert_eq!(waited_ms, 250);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
