//! Error types for Craftable.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! specific conditions. None of them is fatal: every failure is recoverable by
//! re-reading current state and retrying the user action.

use thiserror::Error;

use crate::path::DataPath;
use crate::storage::StorageError;

/// Validation errors. These are raised before anything is sent to the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Actor id cannot be empty")]
    EmptyActorId,

    #[error("Malformed engagement record at '{path}': {reason}")]
    MalformedRecord {
        path: String,
        reason: String,
    },

    #[error("Invalid path segment '{segment}': {reason}")]
    InvalidPathSegment {
        segment: String,
        reason: String,
    },

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    FieldTooLong {
        field: String,
        max_length: usize,
    },

    #[error("Comment thread cannot be empty")]
    EmptyThread,

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Top-level error type for Craftable.
#[derive(Debug, Error)]
pub enum CraftError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Reconciliation failed at '{path}' after {attempts} attempts")]
    ReconciliationFailed {
        path: DataPath,
        attempts: u32,
    },

    #[error("Read failed at '{path}': {reason}")]
    ReadFailed {
        path: DataPath,
        reason: String,
    },

    #[error("Item not found: {path}")]
    NotFound {
        path: DataPath,
    },

    #[error("No authenticated actor")]
    Unauthenticated,

    #[error("Timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl CraftError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if a transaction exhausted its retry budget.
    #[must_use]
    pub const fn is_reconciliation_failed(&self) -> bool {
        matches!(self, Self::ReconciliationFailed { .. })
    }

    /// Returns true if this is a read/subscription failure.
    #[must_use]
    pub const fn is_read_failed(&self) -> bool {
        matches!(self, Self::ReadFailed { .. })
    }

    /// Returns true if the targeted item does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if retrying the same user action may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::ReconciliationFailed { .. } | Self::ReadFailed { .. } | Self::Timeout { .. } => true,
            Self::Storage(e) => e.is_transient(),
            Self::Validation(_) | Self::NotFound { .. } | Self::Unauthenticated | Self::Internal { .. } => false,
        }
    }
}

impl From<StorageError> for CraftError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TransactionExhausted { path, attempts } => Self::ReconciliationFailed { path, attempts },
            StorageError::InvalidPath(e) => Self::Validation(e),
            other => Self::Storage(other),
        }
    }
}

/// Result type alias for Craftable operations.
pub type CraftResult<T> = Result<T, CraftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::FieldTooLong {
            field: "title".to_string(),
            max_length: 200,
        };
        let msg = err.to_string();
        assert!(msg.contains("title"));
        assert!(msg.contains("200"));
    }

    #[test]
    fn test_reconciliation_failed_is_retryable() {
        let err = CraftError::ReconciliationFailed {
            path: DataPath::parse("posts/p1").unwrap(),
            attempts: 25,
        };
        assert!(err.is_reconciliation_failed());
        assert!(err.is_retryable());
        let msg = err.to_string();
        assert!(msg.contains("posts/p1"));
        assert!(msg.contains("25"));
    }

    #[test]
    fn test_validation_from() {
        let err: CraftError = ValidationError::EmptyActorId.into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_storage_transient_retryable() {
        let err: CraftError = StorageError::Disconnected("dispatcher".to_string()).into();
        assert!(err.is_retryable());

        let err: CraftError = StorageError::SerializationError("bad".to_string()).into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_exhausted_transaction_maps_to_reconciliation_failed() {
        let err: CraftError = StorageError::TransactionExhausted {
            path: DataPath::parse("posts/p1").unwrap(),
            attempts: 4,
        }
        .into();
        assert!(matches!(err, CraftError::ReconciliationFailed { attempts: 4, .. }));
    }

    #[test]
    fn test_internal() {
        let err = CraftError::internal("unexpected state");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("unexpected state"));
    }
}
