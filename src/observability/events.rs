//! Observable events
//!
//! Events are explicit and typed. Each maps to a stable upper-case name
//! used as the `event` field of a log line.

use std::fmt;

/// Observable events in kvguard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Store lifecycle
    /// Store opened over a backend
    StoreOpened,
    /// Configuration replaced at runtime
    ConfigUpdated,

    // Write path
    /// Pre-write snapshot stored
    BackupCreated,
    /// New record committed
    WriteCommit,
    /// Commit rejected by the backend
    WriteRejected,
    /// Backend capacity exhausted
    QuotaExceeded,
    /// Record removed
    RecordRemoved,

    // Read path
    /// Checksum or parse failure
    CorruptionDetected,
    /// Read healed from a backup
    TransparentRecovery,

    // Recovery
    /// Explicit recovery started
    RecoveryStart,
    /// Recovery restored a backup
    RecoveryComplete,
    /// Recovery declined or impossible
    RecoveryFailed,
    /// Batch session started
    SessionStart,
    /// Batch session reached a terminal state
    SessionComplete,

    // Maintenance
    /// Backup retention pass finished
    CleanupComplete,
    /// Background task started
    TaskStart,
    /// Background task stopped
    TaskStop,

    // Analytics
    /// Trend sample appended
    AnalyticsSample,
    /// Old samples pruned
    AnalyticsPrune,

    // Transfer
    /// Export produced
    ExportComplete,
    /// Import applied
    ImportComplete,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::StoreOpened => "STORE_OPENED",
            Event::ConfigUpdated => "CONFIG_UPDATED",

            Event::BackupCreated => "BACKUP_CREATED",
            Event::WriteCommit => "WRITE_COMMIT",
            Event::WriteRejected => "WRITE_REJECTED",
            Event::QuotaExceeded => "QUOTA_EXCEEDED",
            Event::RecordRemoved => "RECORD_REMOVED",

            Event::CorruptionDetected => "CORRUPTION_DETECTED",
            Event::TransparentRecovery => "TRANSPARENT_RECOVERY",

            Event::RecoveryStart => "RECOVERY_START",
            Event::RecoveryComplete => "RECOVERY_COMPLETE",
            Event::RecoveryFailed => "RECOVERY_FAILED",
            Event::SessionStart => "RECOVERY_SESSION_START",
            Event::SessionComplete => "RECOVERY_SESSION_COMPLETE",

            Event::CleanupComplete => "CLEANUP_COMPLETE",
            Event::TaskStart => "TASK_START",
            Event::TaskStop => "TASK_STOP",

            Event::AnalyticsSample => "ANALYTICS_SAMPLE",
            Event::AnalyticsPrune => "ANALYTICS_PRUNE",

            Event::ExportComplete => "EXPORT_COMPLETE",
            Event::ImportComplete => "IMPORT_COMPLETE",
        }
    }

    /// Events that indicate something went wrong
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Event::WriteRejected
                | Event::QuotaExceeded
                | Event::CorruptionDetected
                | Event::TransparentRecovery
                | Event::RecoveryFailed
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(Event::TransparentRecovery.as_str(), "TRANSPARENT_RECOVERY");
        assert_eq!(Event::SessionComplete.to_string(), "RECOVERY_SESSION_COMPLETE");
    }

    #[test]
    fn test_warning_events() {
        assert!(Event::CorruptionDetected.is_warning());
        assert!(!Event::WriteCommit.is_warning());
    }
}
