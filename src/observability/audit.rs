//! Security audit collaborator
//!
//! Every transparent recovery, explicit recovery, export and import is
//! reported as a [`SecurityEvent`]. The sink also supplies the user context
//! used to tag events.
//!
//! Sinks:
//! - [`MemoryAuditSink`] keeps events in memory (tests, embedding)
//! - [`FileAuditSink`] appends one JSON object per line and syncs
//! - [`LogAuditSink`] forwards events to the structured logger

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::logger::Logger;

/// Kind of security-relevant event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventType {
    /// Data restored from a backup
    DataRecovery,
    /// Store contents exported
    DataExport,
    /// Package imported into the store
    DataImport,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::DataRecovery => "DATA_RECOVERY",
            SecurityEventType::DataExport => "DATA_EXPORT",
            SecurityEventType::DataImport => "DATA_IMPORT",
        }
    }
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The user on whose behalf the subsystem is acting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub user_id: String,
}

/// `{type, message, timestamp, userId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    #[serde(rename = "type")]
    pub event_type: SecurityEventType,
    pub message: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub user_id: Option<String>,
}

impl SecurityEvent {
    /// New event stamped with the current time and no user
    pub fn new(event_type: SecurityEventType, message: impl Into<String>) -> Self {
        Self {
            event_type,
            message: message.into(),
            timestamp: Utc::now().timestamp_millis(),
            user_id: None,
        }
    }

    /// Tag with the user from `context`, if any
    pub fn with_user(mut self, context: Option<UserContext>) -> Self {
        self.user_id = context.map(|c| c.user_id);
        self
    }
}

/// Audit collaborator contract.
///
/// `log_security_event` is infallible; sink failures are logged, not returned.
pub trait AuditSink: Send + Sync {
    /// Record an event
    fn log_security_event(&self, event: SecurityEvent);

    /// Current user, if one is known
    fn user_context(&self) -> Option<UserContext> {
        None
    }

    /// Build an event for `event_type`, tag it with the user and record it
    fn record(&self, event_type: SecurityEventType, message: &str) {
        let event = SecurityEvent::new(event_type, message).with_user(self.user_context());
        self.log_security_event(event);
    }
}

/// In-memory sink
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<SecurityEvent>>,
    user: Mutex<Option<UserContext>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the user returned by `user_context`
    pub fn set_user(&self, user_id: Option<&str>) {
        let mut user = self.user.lock().unwrap_or_else(|e| e.into_inner());
        *user = user_id.map(|id| UserContext {
            user_id: id.to_string(),
        });
    }

    /// All recorded events, oldest first
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Events of one type
    pub fn events_of(&self, event_type: SecurityEventType) -> Vec<SecurityEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn log_security_event(&self, event: SecurityEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }

    fn user_context(&self) -> Option<UserContext> {
        self.user.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Append-only JSON-lines file sink
pub struct FileAuditSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileAuditSink {
    /// Open or create an audit file
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, event: &SecurityEvent) -> io::Result<()> {
        let json = serde_json::to_string(event)?;
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        writer.get_ref().sync_all()
    }
}

impl AuditSink for FileAuditSink {
    fn log_security_event(&self, event: SecurityEvent) {
        if let Err(e) = self.append(&event) {
            let reason = e.to_string();
            Logger::error(
                "AUDIT_WRITE_FAILED",
                &[("path", &self.path.display().to_string()), ("reason", &reason)],
            );
        }
    }
}

/// Sink that writes events to the structured log
#[derive(Debug, Default)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn log_security_event(&self, event: SecurityEvent) {
        let timestamp = event.timestamp.to_string();
        let user = event.user_id.as_deref().unwrap_or("anonymous");
        Logger::warn(
            "SECURITY_EVENT",
            &[
                ("type", event.event_type.as_str()),
                ("message", &event.message),
                ("timestamp", &timestamp),
                ("user_id", user),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_memory_sink_tags_user() {
        let sink = MemoryAuditSink::new();
        sink.record(SecurityEventType::DataExport, "export");
        sink.set_user(Some("u-42"));
        sink.record(SecurityEventType::DataRecovery, "healed tasks");

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].user_id, None);
        assert_eq!(events[1].user_id.as_deref(), Some("u-42"));
        assert_eq!(sink.events_of(SecurityEventType::DataRecovery).len(), 1);
    }

    #[test]
    fn test_event_wire_format() {
        let event = SecurityEvent::new(SecurityEventType::DataRecovery, "m");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "DATA_RECOVERY");
        assert!(json.get("userId").is_some());
        assert!(json["timestamp"].is_i64());
    }

    #[test]
    fn test_file_sink_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let sink = FileAuditSink::open(&path).unwrap();
        sink.record(SecurityEventType::DataExport, "first");
        sink.record(SecurityEventType::DataImport, "second");

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: SecurityEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.event_type, SecurityEventType::DataImport);
    }
}
