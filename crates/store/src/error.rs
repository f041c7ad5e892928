//! Error types for the store crate.

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Store error types.
///
/// Every variant except `Invalid` is transient from the caller's point of
/// view and may be retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("object '{name}' not found")]
    NotFound { name: String },

    #[error("object '{name}' already exists")]
    AlreadyExists { name: String },

    #[error("conflict on '{name}': submitted version {submitted}, current version {current}")]
    Conflict {
        name: String,
        submitted: u64,
        current: u64,
    },

    #[error("operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("transport error during '{operation}': {reason}")]
    Transport { operation: String, reason: String },

    #[error("invalid object: {reason}")]
    Invalid { reason: String },
}

impl StoreError {
    /// Create a not found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create an already exists error.
    pub fn already_exists(name: impl Into<String>) -> Self {
        Self::AlreadyExists { name: name.into() }
    }

    /// Create a conflict error.
    pub fn conflict(name: impl Into<String>, submitted: u64, current: u64) -> Self {
        Self::Conflict {
            name: name.into(),
            submitted,
            current,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a transport error.
    pub fn transport(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid object error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    /// Whether the error reports a missing object.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the error is an optimistic concurrency rejection.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether retrying the same call later may succeed.
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Invalid { .. })
    }
}
