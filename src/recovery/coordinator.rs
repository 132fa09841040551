//! Recovery coordinator
//!
//! Checks keys for corruption and rule violations, and heals them from
//! backups according to a strategy:
//!
//! | strategy     | valid data        | checksum/parse failure | rule violation |
//! |--------------|-------------------|------------------------|----------------|
//! | auto         | no-op + warning   | restore                | restore        |
//! | conservative | no-op + warning   | restore                | abort          |
//! | manual       | RecoveryError     | RecoveryError          | RecoveryError  |
//!
//! Restores use the newest backup that verifies and, when rules apply,
//! passes validation.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{StoreError, StoreResult};
use crate::observability::{log_event, Event, SecurityEventType};
use crate::store::{Backup, IntegrityStore, RecordState};

use super::report::{CorruptionType, IntegrityReport, RecoveryRecommendations};
use super::session::{RecoverySession, SessionRegistry, SessionStatus};
use super::validator::{validate, RuleSet, ValidationRules};

/// Recovery policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryStrategy {
    #[default]
    Auto,
    Conservative,
    Manual,
}

impl RecoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::Auto => "auto",
            RecoveryStrategy::Conservative => "conservative",
            RecoveryStrategy::Manual => "manual",
        }
    }
}

impl std::str::FromStr for RecoveryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(RecoveryStrategy::Auto),
            "conservative" => Ok(RecoveryStrategy::Conservative),
            "manual" => Ok(RecoveryStrategy::Manual),
            other => Err(format!("unknown recovery strategy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryOptions {
    pub strategy: RecoveryStrategy,
}

impl RecoveryOptions {
    pub fn with_strategy(strategy: RecoveryStrategy) -> Self {
        Self { strategy }
    }
}

/// Successful `recover` result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryOutcome {
    pub key: String,
    /// False when nothing needed recovery
    pub recovered: bool,
    pub restored_from: Option<String>,
    pub data: Option<Value>,
    pub warnings: Vec<String>,
}

/// Warning attached when the data was already valid
pub const NO_RECOVERY_NEEDED: &str = "no recovery needed";

pub struct RecoveryCoordinator {
    store: Arc<IntegrityStore>,
    rules: RwLock<RuleSet>,
    sessions: SessionRegistry,
}

impl std::fmt::Debug for RecoveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCoordinator")
            .field("store", &self.store)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl RecoveryCoordinator {
    pub fn new(store: Arc<IntegrityStore>) -> Self {
        Self {
            store,
            rules: RwLock::new(RuleSet::new()),
            sessions: SessionRegistry::new(),
        }
    }

    pub fn store(&self) -> &Arc<IntegrityStore> {
        &self.store
    }

    /// Validate keys matching `pattern` with `rules`
    pub fn register_rules(&self, pattern: &str, rules: ValidationRules) -> StoreResult<()> {
        self.rules
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .register(pattern, rules)
    }

    fn rules_for(&self, key: &str) -> Option<ValidationRules> {
        if !self.store.config().storage.enable_validation {
            return None;
        }
        self.rules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .rules_for(key)
            .cloned()
    }

    // =========================================================================
    // Integrity checks
    // =========================================================================

    /// Check each key, in order
    pub fn integrity_check<S: AsRef<str>>(&self, keys: &[S]) -> Vec<IntegrityReport> {
        keys.iter().map(|k| self.check_key(k.as_ref())).collect()
    }

    /// Check one key without modifying anything
    pub fn check_key(&self, key: &str) -> IntegrityReport {
        let rules = self.rules_for(key);
        let validating = self.store.config().storage.enable_validation;
        let available = self.usable_backups(key, rules.as_ref()).len();

        let state = match self.store.load_record(key) {
            Ok(state) => state,
            Err(e) => {
                return IntegrityReport::invalid(key, vec![e.to_string()], vec![], None, available)
            }
        };

        match state {
            RecordState::Missing => IntegrityReport::invalid(
                key,
                vec!["no data found".to_string()],
                vec![],
                None,
                available,
            ),
            RecordState::Corrupt { reason, .. } => IntegrityReport::invalid(
                key,
                vec![reason],
                vec![],
                Some(CorruptionType::Structure),
                available,
            ),
            RecordState::Valid(record) if validating => {
                let outcome = validate(&record.data, rules.as_ref());
                if outcome.is_valid() {
                    IntegrityReport::valid(key, outcome.warnings, available)
                } else {
                    IntegrityReport::invalid(
                        key,
                        outcome.errors,
                        outcome.warnings,
                        Some(CorruptionType::Schema),
                        available,
                    )
                }
            }
            RecordState::Valid(_) => IntegrityReport::valid(key, vec![], available),
        }
    }

    /// Backups that verify and pass the key's rules, newest first
    fn usable_backups(&self, key: &str, rules: Option<&ValidationRules>) -> Vec<Backup> {
        self.store
            .get_backup_history(key)
            .unwrap_or_default()
            .into_iter()
            .filter(|b| b.is_valid())
            .filter(|b| rules.map(|r| validate(&b.data, Some(r)).is_valid()).unwrap_or(true))
            .collect()
    }

    // =========================================================================
    // Recovery
    // =========================================================================

    /// Heal `key` according to `options.strategy`
    pub fn recover(&self, key: &str, options: RecoveryOptions) -> StoreResult<RecoveryOutcome> {
        log_event(
            Event::RecoveryStart,
            &[("key", key), ("strategy", options.strategy.as_str())],
        );

        let result = self.recover_inner(key, options);
        match &result {
            Ok(outcome) if outcome.recovered => {
                let from = outcome.restored_from.clone().unwrap_or_default();
                log_event(Event::RecoveryComplete, &[("key", key), ("backup_id", &from)]);
            }
            Ok(_) => {}
            Err(e) => {
                log_event(Event::RecoveryFailed, &[("key", key), ("reason", &e.to_string())]);
            }
        }
        result
    }

    fn recover_inner(&self, key: &str, options: RecoveryOptions) -> StoreResult<RecoveryOutcome> {
        if options.strategy == RecoveryStrategy::Manual {
            return Err(self.declined(key, "manual recovery requires user intervention"));
        }

        let report = self.check_key(key);
        if report.is_valid {
            let mut warnings = vec![NO_RECOVERY_NEEDED.to_string()];
            warnings.extend(report.warnings);
            return Ok(RecoveryOutcome {
                key: key.to_string(),
                recovered: false,
                restored_from: None,
                data: None,
                warnings,
            });
        }

        if options.strategy == RecoveryStrategy::Conservative && report.is_schema_error() {
            return Err(self.declined(
                key,
                format!(
                    "conservative recovery aborted on validation failure: {}",
                    report.errors.join("; ")
                ),
            ));
        }

        let rules = self.rules_for(key);
        let Some(backup) = self.usable_backups(key, rules.as_ref()).into_iter().next() else {
            return Err(self.declined(key, "no valid backups available"));
        };

        self.store.restore(key, &backup.id)?;
        self.store.usage_tracker().record_recovery();
        self.store.audit().record(
            SecurityEventType::DataRecovery,
            &format!(
                "Recovered '{}' from backup {} ({} strategy)",
                key,
                backup.id,
                options.strategy.as_str()
            ),
        );

        Ok(RecoveryOutcome {
            key: key.to_string(),
            recovered: true,
            restored_from: Some(backup.id),
            data: Some(backup.data),
            warnings: report.errors,
        })
    }

    fn declined(&self, key: &str, reason: impl Into<String>) -> StoreError {
        StoreError::Recovery {
            key: key.to_string(),
            reason: reason.into(),
            available_backups: self.store.backup_summaries(key),
        }
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Register a session over `keys` without running it
    pub fn start_session<S: AsRef<str>>(&self, keys: &[S]) -> String {
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        let total = keys.len().to_string();
        let id = self.sessions.create(keys);
        log_event(Event::SessionStart, &[("session_id", &id), ("total", &total)]);
        id
    }

    /// Process a session's keys in order, observing cancellation between
    /// keys. The terminal session is removed from the registry and returned.
    pub fn run_session(&self, id: &str, options: RecoveryOptions) -> StoreResult<RecoverySession> {
        let Some(session) = self.sessions.peek(id) else {
            return Err(StoreError::recovery(id, "recovery session not found"));
        };

        for key in &session.keys {
            let cancelled = self
                .sessions
                .peek(id)
                .map(|s| s.status == SessionStatus::Cancelled)
                .unwrap_or(true);
            if cancelled {
                break;
            }

            let result = self.recover(key, options);
            self.sessions.update(id, |s| match result {
                Ok(_) => s.record_success(key),
                Err(e) => s.record_failure(key, e.to_string()),
            });
        }

        self.sessions.update(id, RecoverySession::finish);
        let finished = self
            .sessions
            .remove(id)
            .ok_or_else(|| StoreError::recovery(id, "recovery session vanished"))?;

        log_event(
            Event::SessionComplete,
            &[
                ("session_id", id),
                ("status", finished.status.as_str()),
                ("recovered", &finished.summary.recovered.to_string()),
                ("failed", &finished.summary.failed.to_string()),
            ],
        );
        Ok(finished)
    }

    /// Recover `keys` in order under one session
    pub fn batch_recover<S: AsRef<str>>(
        &self,
        keys: &[S],
        options: RecoveryOptions,
    ) -> StoreResult<RecoverySession> {
        let id = self.start_session(keys);
        self.run_session(&id, options)
    }

    /// In-progress session by id
    pub fn get_session(&self, id: &str) -> Option<RecoverySession> {
        self.sessions.get(id)
    }

    /// Request cancellation; takes effect before the next key
    pub fn cancel_session(&self, id: &str) -> bool {
        self.sessions.cancel(id)
    }

    // =========================================================================
    // Recommendations
    // =========================================================================

    pub fn recommendations<S: AsRef<str>>(&self, keys: &[S]) -> RecoveryRecommendations {
        RecoveryRecommendations::from_reports(self.integrity_check(keys))
    }
}
