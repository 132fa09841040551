//! Recovery session registry
//!
//! An arena of in-progress sessions keyed by id. A session is created when a
//! batch starts, updated as each key resolves, and removed once it reaches a
//! terminal status. Lookups never return terminal sessions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

/// `recovered + failed == total` once the session is terminal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total: usize,
    pub recovered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverySession {
    pub id: String,
    pub status: SessionStatus,
    /// Keys to process, in order
    pub keys: Vec<String>,
    /// Keys resolved so far, in order
    pub keys_processed: Vec<String>,
    /// key -> reason, for keys that did not recover
    pub failures: BTreeMap<String, String>,
    pub summary: SessionSummary,
    pub start_time: i64,
    pub end_time: Option<i64>,
}

impl RecoverySession {
    fn new(keys: Vec<String>) -> Self {
        let start_time = Utc::now().timestamp_millis();
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("recovery_{}_{}", start_time, &suffix[..8]),
            status: SessionStatus::InProgress,
            summary: SessionSummary {
                total: keys.len(),
                ..SessionSummary::default()
            },
            keys,
            keys_processed: Vec::new(),
            failures: BTreeMap::new(),
            start_time,
            end_time: None,
        }
    }

    pub fn record_success(&mut self, key: &str) {
        self.keys_processed.push(key.to_string());
        self.summary.recovered += 1;
    }

    pub fn record_failure(&mut self, key: &str, reason: impl Into<String>) {
        self.keys_processed.push(key.to_string());
        self.failures.insert(key.to_string(), reason.into());
        self.summary.failed += 1;
    }

    /// Keys not yet processed
    pub fn remaining(&self) -> &[String] {
        let done = self.keys_processed.len().min(self.keys.len());
        &self.keys[done..]
    }

    /// Close the session: remaining keys count as failed when cancelled
    pub fn finish(&mut self) {
        if self.status == SessionStatus::Cancelled {
            let remaining: Vec<String> = self.remaining().to_vec();
            for key in remaining {
                self.failures.insert(key, "cancelled".to_string());
                self.summary.failed += 1;
            }
        } else if self.summary.failed == 0 {
            self.status = SessionStatus::Completed;
        } else {
            self.status = SessionStatus::Failed;
        }
        self.end_time = Some(Utc::now().timestamp_millis());
    }
}

/// id -> in-progress session
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, RecoverySession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session over `keys`, returning its id
    pub fn create(&self, keys: Vec<String>) -> String {
        let session = RecoverySession::new(keys);
        let id = session.id.clone();
        self.lock().insert(id.clone(), session);
        id
    }

    /// Non-terminal session by id
    pub fn get(&self, id: &str) -> Option<RecoverySession> {
        self.lock()
            .get(id)
            .filter(|s| !s.status.is_terminal())
            .cloned()
    }

    /// Raw lookup, terminal or not; used by the session runner
    pub(crate) fn peek(&self, id: &str) -> Option<RecoverySession> {
        self.lock().get(id).cloned()
    }

    /// Apply `change` to a session; false if unknown
    pub fn update<F>(&self, id: &str, change: F) -> bool
    where
        F: FnOnce(&mut RecoverySession),
    {
        match self.lock().get_mut(id) {
            Some(session) => {
                change(session);
                true
            }
            None => false,
        }
    }

    /// Mark an in-progress session cancelled; false if unknown or terminal
    pub fn cancel(&self, id: &str) -> bool {
        match self.lock().get_mut(id) {
            Some(session) if !session.status.is_terminal() => {
                session.status = SessionStatus::Cancelled;
                true
            }
            _ => false,
        }
    }

    pub fn remove(&self, id: &str) -> Option<RecoverySession> {
        self.lock().remove(id)
    }

    /// Number of sessions held, terminal ones awaiting removal included
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, RecoverySession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_create_get_remove() {
        let registry = SessionRegistry::new();
        let id = registry.create(keys(&["a", "b"]));
        assert!(id.starts_with("recovery_"));

        let session = registry.get(&id).unwrap();
        assert_eq!(session.status, SessionStatus::InProgress);
        assert_eq!(session.summary.total, 2);

        assert!(registry.remove(&id).is_some());
        assert!(registry.get(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_hides_session() {
        let registry = SessionRegistry::new();
        let id = registry.create(keys(&["a"]));
        assert!(registry.cancel(&id));
        assert!(registry.get(&id).is_none());
        assert!(!registry.cancel(&id));
        assert!(!registry.cancel("recovery_unknown"));
        assert_eq!(registry.peek(&id).unwrap().status, SessionStatus::Cancelled);
    }

    #[test]
    fn test_finish_counts_remaining_as_failed() {
        let mut session = RecoverySession::new(keys(&["a", "b", "c"]));
        session.record_success("a");
        session.status = SessionStatus::Cancelled;
        session.finish();
        assert_eq!(session.summary.recovered, 1);
        assert_eq!(session.summary.failed, 2);
        assert_eq!(session.failures["c"], "cancelled");
        assert!(session.end_time.is_some());
    }

    #[test]
    fn test_finish_status() {
        let mut ok = RecoverySession::new(keys(&["a"]));
        ok.record_success("a");
        ok.finish();
        assert_eq!(ok.status, SessionStatus::Completed);

        let mut bad = RecoverySession::new(keys(&["a", "b"]));
        bad.record_success("a");
        bad.record_failure("b", "no valid backups available");
        bad.finish();
        assert_eq!(bad.status, SessionStatus::Failed);
        assert_eq!(bad.summary.recovered + bad.summary.failed, bad.summary.total);
    }
}
