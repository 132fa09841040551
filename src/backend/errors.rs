//! # Backend Errors

use thiserror::Error;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Backend failures, classified the way the integrity layer reports them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Capacity exhausted
    #[error("Quota exceeded: {required} bytes required, {available} available")]
    QuotaExceeded { required: u64, available: u64 },

    /// Backend switched off or inaccessible
    #[error("Storage disabled: {0}")]
    Disabled(String),

    /// Any other I/O failure
    #[error("I/O error: {0}")]
    Io(String),
}

impl BackendError {
    /// Whether retrying after freeing space could succeed
    pub fn is_quota(&self) -> bool {
        matches!(self, BackendError::QuotaExceeded { .. })
    }
}
