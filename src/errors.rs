//! Error taxonomy for kvguard
//!
//! Every fallible store, recovery and analytics operation returns
//! [`StoreResult`]. Five kinds exist:
//!
//! - `QuotaExceededError` - backend capacity exhausted
//! - `CorruptionError` - checksum mismatch or unparsable record
//! - `StorageDisabledError` - backend unavailable
//! - `ValidationError` - structural/schema violation, bad key or payload
//! - `RecoveryError` - a recovery strategy declined or was impossible
//!
//! Write-path quota and disabled conditions are always surfaced. Read-path
//! corruption only surfaces when no valid backup exists.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BackendError;
use crate::store::BackupSummary;

/// Stable error codes, one per error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Backend capacity exhausted
    KvQuotaExceeded,
    /// Checksum mismatch or unparsable record
    KvCorruption,
    /// Backend unavailable
    KvStorageDisabled,
    /// Structural or input validation failure
    KvValidation,
    /// Recovery declined or impossible
    KvRecovery,
}

impl ErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::KvQuotaExceeded => "KV_QUOTA_EXCEEDED",
            ErrorCode::KvCorruption => "KV_CORRUPTION",
            ErrorCode::KvStorageDisabled => "KV_STORAGE_DISABLED",
            ErrorCode::KvValidation => "KV_VALIDATION",
            ErrorCode::KvRecovery => "KV_RECOVERY",
        }
    }

    /// Returns the error name exposed to external consumers
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::KvQuotaExceeded => "QuotaExceededError",
            ErrorCode::KvCorruption => "CorruptionError",
            ErrorCode::KvStorageDisabled => "StorageDisabledError",
            ErrorCode::KvValidation => "ValidationError",
            ErrorCode::KvRecovery => "RecoveryError",
        }
    }
}

/// Error returned by every kvguard operation.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Quota exceeded writing '{key}': {required} bytes required, {available} available")]
    QuotaExceeded {
        key: String,
        required: u64,
        available: u64,
    },

    #[error("Corrupted data for '{key}': {reason}")]
    Corruption { key: String, reason: String },

    #[error("Storage disabled: {reason}")]
    StorageDisabled { reason: String },

    #[error("Validation failed for '{key}': {}", .errors.join("; "))]
    Validation { key: String, errors: Vec<String> },

    #[error("Recovery failed for '{key}': {reason}")]
    Recovery {
        key: String,
        reason: String,
        available_backups: Vec<BackupSummary>,
    },
}

impl StoreError {
    /// Validation error with a single message
    pub fn validation(key: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Validation {
            key: key.into(),
            errors: vec![message.into()],
        }
    }

    /// Corruption error for a key
    pub fn corruption(key: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Corruption {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Recovery error without backup context
    pub fn recovery(key: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Recovery {
            key: key.into(),
            reason: reason.into(),
            available_backups: Vec::new(),
        }
    }

    /// Convert a backend failure observed while touching `key`
    pub fn from_backend(key: &str, err: BackendError) -> Self {
        match err {
            BackendError::QuotaExceeded {
                required,
                available,
            } => StoreError::QuotaExceeded {
                key: key.to_string(),
                required,
                available,
            },
            BackendError::Disabled(reason) => StoreError::StorageDisabled { reason },
            BackendError::Io(reason) => StoreError::StorageDisabled {
                reason: format!("backend I/O failure on '{}': {}", key, reason),
            },
        }
    }

    /// Returns the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::QuotaExceeded { .. } => ErrorCode::KvQuotaExceeded,
            StoreError::Corruption { .. } => ErrorCode::KvCorruption,
            StoreError::StorageDisabled { .. } => ErrorCode::KvStorageDisabled,
            StoreError::Validation { .. } => ErrorCode::KvValidation,
            StoreError::Recovery { .. } => ErrorCode::KvRecovery,
        }
    }

    /// Returns the external error name, e.g. `RecoveryError`
    pub fn name(&self) -> &'static str {
        self.code().name()
    }

    /// Backups a caller may choose from after a declined recovery
    pub fn available_backups(&self) -> &[BackupSummary] {
        match self {
            StoreError::Recovery {
                available_backups, ..
            } => available_backups,
            _ => &[],
        }
    }
}

/// Result type for kvguard operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Serialized form of an error inside an [`OperationResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub name: String,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_backups: Vec<BackupSummary>,
}

impl From<&StoreError> for ErrorInfo {
    fn from(err: &StoreError) -> Self {
        Self {
            name: err.name().to_string(),
            code: err.code().code().to_string(),
            message: err.to_string(),
            available_backups: err.available_backups().to_vec(),
        }
    }
}

/// `{success, data?, error?}` envelope handed to external consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl<T> OperationResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            warnings: Vec::new(),
        }
    }

    pub fn failed(err: &StoreError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorInfo::from(err)),
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

impl<T> From<StoreResult<T>> for OperationResult<T> {
    fn from(result: StoreResult<T>) -> Self {
        match result {
            Ok(data) => OperationResult::ok(data),
            Err(err) => OperationResult::failed(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names_match_taxonomy() {
        assert_eq!(
            StoreError::corruption("k", "bad").name(),
            "CorruptionError"
        );
        assert_eq!(StoreError::recovery("k", "none").name(), "RecoveryError");
        assert_eq!(StoreError::validation("k", "empty").name(), "ValidationError");
        assert_eq!(
            StoreError::StorageDisabled {
                reason: "off".into()
            }
            .name(),
            "StorageDisabledError"
        );
        assert_eq!(
            StoreError::QuotaExceeded {
                key: "k".into(),
                required: 10,
                available: 1
            }
            .name(),
            "QuotaExceededError"
        );
    }

    #[test]
    fn test_backend_errors_are_classified() {
        let err = StoreError::from_backend(
            "tasks",
            BackendError::QuotaExceeded {
                required: 100,
                available: 5,
            },
        );
        assert_eq!(err.code(), ErrorCode::KvQuotaExceeded);

        let err = StoreError::from_backend("tasks", BackendError::Disabled("private mode".into()));
        assert_eq!(err.code(), ErrorCode::KvStorageDisabled);

        let err = StoreError::from_backend("tasks", BackendError::Io("EIO".into()));
        assert_eq!(err.code(), ErrorCode::KvStorageDisabled);
        assert!(err.to_string().contains("tasks"));
    }

    #[test]
    fn test_operation_result_envelope() {
        let ok: OperationResult<u32> = Ok(7).into();
        assert!(ok.success);
        assert_eq!(ok.data, Some(7));

        let failed: OperationResult<u32> = Err(StoreError::recovery("k", "nothing")).into();
        assert!(!failed.success);
        let info = failed.error.unwrap();
        assert_eq!(info.name, "RecoveryError");
        assert_eq!(info.code, "KV_RECOVERY");

        let json = serde_json::to_value(&OperationResult::ok(1u8)).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("error").is_none());
    }
}
