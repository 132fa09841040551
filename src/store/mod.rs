//! Integrity Store
//!
//! Wraps a raw [`StorageBackend`] and adds:
//!
//! - checksum + version metadata on every record
//! - a backup snapshot before every write commits
//! - quota and usage tracking
//! - transparent read-time recovery from the newest valid backup
//!
//! # Write path
//!
//! 1. Validate key and payload
//! 2. Snapshot: the existing record, or a baseline of the new value when
//!    the key has no record yet (corrupted records are not snapshotted)
//! 3. Compute digests and wrap the value
//! 4. Commit to the backend
//!
//! A rejected commit leaves the snapshot from step 2 in place; it holds the
//! prior state. Writes on one store are serialized by a write lock.
//!
//! # Read path
//!
//! A record whose digests do not match, or that does not parse, is
//! corruption. The newest backup whose own digests match is restored
//! through the write path (operation `restore`) and its data returned.
//! Only when no such backup exists does the read fail.

mod backups;
mod checksum;
mod record;
mod transfer;
mod usage;

pub use backups::{history_key, BACKUP_PREFIX};
pub use checksum::{canonical_json, compute_checksum, compute_crc32, digest, format_crc32, Digest};
pub use record::{Backup, BackupSummary, Operation, Record, RecordMetadata, RECORD_FORMAT_VERSION};
pub use transfer::{ExportPackage, ImportOptions, ImportReport, EXPORT_FORMAT_VERSION};
pub use usage::{SizeHistogram, UsageCounters, UsageReport, UsageTracker};

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{MemoryBackend, StorageBackend};
use crate::config::Config;
use crate::errors::{StoreError, StoreResult};
use crate::observability::{log_event, AuditSink, Event, LogAuditSink, Logger, SecurityEventType};
use crate::task::PeriodicTask;

use backups::{prune, BackupLog};

/// Outcome of a committed write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteReceipt {
    pub key: String,
    pub operation: Operation,
    pub timestamp: i64,
    pub checksum: String,
    /// Snapshot taken before the commit, if any
    pub backup_id: Option<String>,
    pub size_bytes: u64,
}

/// Outcome of a read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadOutcome {
    pub key: String,
    /// `None` when the key has no record
    pub data: Option<Value>,
    pub metadata: Option<RecordMetadata>,
    /// True when the value was healed from a backup
    pub recovered: bool,
    pub restored_from: Option<String>,
}

/// Outcome of a retention pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub keys_scanned: usize,
    pub removed: usize,
    pub remaining: usize,
}

/// State of a key's current record
#[derive(Debug, Clone)]
pub enum RecordState {
    /// No record stored
    Missing,
    /// Record parsed and digests match
    Valid(Record),
    /// Record failed to parse or verify
    Corrupt {
        reason: String,
        /// The parsed record, when parsing succeeded
        record: Option<Record>,
    },
}

/// Backup taken ahead of a write
struct Snapshot {
    id: String,
    /// First write of the key: the backup carries the new value
    baseline: bool,
}

/// Strictly increasing millisecond clock.
///
/// Backups written in the same millisecond still get distinct, ordered
/// timestamps.
#[derive(Debug, Default)]
struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    fn next(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

/// Checksummed, self-healing key-value store
pub struct IntegrityStore {
    backend: Arc<dyn StorageBackend>,
    backups: BackupLog,
    config: RwLock<Config>,
    usage: UsageTracker,
    audit: Arc<dyn AuditSink>,
    write_lock: Mutex<()>,
    clock: MonotonicClock,
    maintenance: Mutex<Option<PeriodicTask>>,
}

impl std::fmt::Debug for IntegrityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityStore")
            .field("backend", &self.backend)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

impl IntegrityStore {
    /// Open a store over `backend`
    pub fn new(backend: Arc<dyn StorageBackend>, config: Config) -> StoreResult<Self> {
        config.validate()?;
        let capacity = backend
            .capacity()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unbounded".to_string());
        log_event(Event::StoreOpened, &[("capacity_bytes", &capacity)]);
        Ok(Self::assemble(backend, config))
    }

    /// Store over a fresh [`MemoryBackend`] with default quota and config
    pub fn in_memory() -> Self {
        Self::assemble(Arc::new(MemoryBackend::new()), Config::default())
    }

    fn assemble(backend: Arc<dyn StorageBackend>, config: Config) -> Self {
        Self {
            backups: BackupLog::new(Arc::clone(&backend)),
            backend,
            config: RwLock::new(config),
            usage: UsageTracker::new(),
            audit: Arc::new(LogAuditSink),
            write_lock: Mutex::new(()),
            clock: MonotonicClock::default(),
            maintenance: Mutex::new(None),
        }
    }

    /// Replace the audit collaborator
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Underlying backend
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Audit collaborator
    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    /// Current configuration
    pub fn config(&self) -> Config {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Change configuration at runtime; rejected changes leave it untouched
    pub fn update_config<F>(&self, change: F) -> StoreResult<Config>
    where
        F: FnOnce(&mut Config),
    {
        let mut guard = self.config.write().unwrap_or_else(|e| e.into_inner());
        let mut next = guard.clone();
        change(&mut next);
        next.validate()?;
        *guard = next.clone();
        log_event(Event::ConfigUpdated, &[]);
        Ok(next)
    }

    /// Live usage counters
    pub fn usage_tracker(&self) -> &UsageTracker {
        &self.usage
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_key(key: &str) -> StoreResult<()> {
        if key.is_empty() {
            return Err(StoreError::validation(key, "key must be non-empty"));
        }
        if key.starts_with(BACKUP_PREFIX) {
            return Err(StoreError::validation(
                key,
                format!("keys starting with '{}' are reserved", BACKUP_PREFIX),
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Write path
    // =========================================================================

    /// Snapshot, checksum and commit `data` under `key`
    pub fn write(&self, key: &str, data: Value, operation: Operation) -> StoreResult<WriteReceipt> {
        Self::check_key(key)?;
        let _guard = self.lock_writes();
        self.write_locked(key, data, operation, true)
    }

    /// Serialize `value` and write it
    pub fn write_as<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        operation: Operation,
    ) -> StoreResult<WriteReceipt> {
        let data = serde_json::to_value(value)
            .map_err(|e| StoreError::validation(key, format!("data is not serializable: {}", e)))?;
        self.write(key, data, operation)
    }

    /// Write with the write lock already held
    fn write_locked(
        &self,
        key: &str,
        data: Value,
        operation: Operation,
        snapshot: bool,
    ) -> StoreResult<WriteReceipt> {
        self.usage.record_operation(key);
        let timestamp = self.clock.next();

        let taken = if snapshot {
            self.snapshot_before_write(key, &data, operation, timestamp)?
        } else {
            None
        };
        let backup_id = taken.as_ref().map(|s| s.id.clone());

        let record = Record::new(data, operation, timestamp, backup_id.as_deref().unwrap_or(""));
        let committed = record
            .to_json()
            .map_err(|reason| StoreError::validation(key, reason))
            .and_then(|raw| {
                self.backend
                    .set(key, &raw)
                    .map(|_| raw)
                    .map_err(|e| StoreError::from_backend(key, e))
            });
        let raw = match committed {
            Ok(raw) => raw,
            Err(err) => {
                self.note_write_failure(key, &err);
                // a baseline holds the rejected value itself
                if let Some(Snapshot { id, baseline: true }) = &taken {
                    if let Err(e) = self.backups.discard(key, id) {
                        Logger::warn(
                            "BASELINE_DISCARD_FAILED",
                            &[("key", key), ("backup_id", id), ("reason", &e.to_string())],
                        );
                    }
                }
                return Err(err);
            }
        };

        let ts = timestamp.to_string();
        log_event(
            Event::WriteCommit,
            &[("key", key), ("operation", operation.as_str()), ("timestamp", &ts)],
        );

        Ok(WriteReceipt {
            key: key.to_string(),
            operation,
            timestamp,
            checksum: record.metadata.checksum,
            backup_id,
            size_bytes: raw.len() as u64,
        })
    }

    /// Store the pre-write snapshot
    fn snapshot_before_write(
        &self,
        key: &str,
        data: &Value,
        operation: Operation,
        timestamp: i64,
    ) -> StoreResult<Option<Snapshot>> {
        let (backup, baseline) = match self.load_record(key)? {
            RecordState::Valid(existing) => {
                (Backup::of_record(key, &existing, operation, timestamp), false)
            }
            RecordState::Missing => (Backup::baseline(key, data, operation, timestamp), true),
            RecordState::Corrupt { reason, .. } => {
                Logger::warn(
                    "BACKUP_SKIPPED_CORRUPT",
                    &[("key", key), ("reason", &reason)],
                );
                return Ok(None);
            }
        };

        let id = backup.id.clone();
        let max_backups = self.config().backup.max_backups;
        if let Err(err) = self.backups.push(key, backup, max_backups) {
            self.note_write_failure(key, &err);
            return Err(err);
        }
        self.usage.record_backup();
        log_event(
            Event::BackupCreated,
            &[("key", key), ("backup_id", &id), ("operation", operation.as_str())],
        );
        Ok(Some(Snapshot { id, baseline }))
    }

    fn note_write_failure(&self, key: &str, err: &StoreError) {
        let reason = err.to_string();
        if matches!(err, StoreError::QuotaExceeded { .. }) {
            self.usage.record_quota_exceeded();
            log_event(Event::QuotaExceeded, &[("key", key), ("reason", &reason)]);
        } else {
            log_event(Event::WriteRejected, &[("key", key), ("reason", &reason)]);
        }
    }

    /// Snapshot and remove the record for `key`.
    ///
    /// Returns false if there was nothing to remove. A corrupt record is
    /// removed without a snapshot.
    pub fn remove(&self, key: &str) -> StoreResult<bool> {
        Self::check_key(key)?;
        let _guard = self.lock_writes();
        self.usage.record_operation(key);

        match self.load_record(key)? {
            RecordState::Missing => return Ok(false),
            RecordState::Valid(existing) => {
                let timestamp = self.clock.next();
                let backup = Backup::of_record(key, &existing, Operation::Delete, timestamp);
                let id = backup.id.clone();
                self.backups
                    .push(key, backup, self.config().backup.max_backups)?;
                self.usage.record_backup();
                log_event(
                    Event::BackupCreated,
                    &[("key", key), ("backup_id", &id), ("operation", "delete")],
                );
            }
            RecordState::Corrupt { .. } => {}
        }

        self.backend
            .remove(key)
            .map_err(|e| StoreError::from_backend(key, e))?;
        log_event(Event::RecordRemoved, &[("key", key)]);
        Ok(true)
    }

    // =========================================================================
    // Read path
    // =========================================================================

    /// Fetch and classify the current record without side effects
    pub fn load_record(&self, key: &str) -> StoreResult<RecordState> {
        let raw = self
            .backend
            .get(key)
            .map_err(|e| StoreError::from_backend(key, e))?;

        let Some(raw) = raw else {
            return Ok(RecordState::Missing);
        };

        let record = match Record::parse(&raw) {
            Ok(record) => record,
            Err(reason) => {
                return Ok(RecordState::Corrupt {
                    reason,
                    record: None,
                })
            }
        };

        match record.verify() {
            Ok(()) => Ok(RecordState::Valid(record)),
            Err(reason) => Ok(RecordState::Corrupt {
                reason,
                record: Some(record),
            }),
        }
    }

    /// Verify the current record without attempting recovery
    pub fn verify(&self, key: &str) -> StoreResult<Option<Record>> {
        match self.load_record(key)? {
            RecordState::Missing => Ok(None),
            RecordState::Valid(record) => Ok(Some(record)),
            RecordState::Corrupt { reason, .. } => Err(StoreError::corruption(key, reason)),
        }
    }

    /// Read `key`, healing corruption from backups when possible
    pub fn read(&self, key: &str) -> StoreResult<ReadOutcome> {
        Self::check_key(key)?;
        self.usage.record_operation(key);

        let reason = match self.load_record(key)? {
            RecordState::Missing => {
                return Ok(ReadOutcome {
                    key: key.to_string(),
                    data: None,
                    metadata: None,
                    recovered: false,
                    restored_from: None,
                })
            }
            RecordState::Valid(record) => {
                return Ok(ReadOutcome {
                    key: key.to_string(),
                    data: Some(record.data),
                    metadata: Some(record.metadata),
                    recovered: false,
                    restored_from: None,
                })
            }
            RecordState::Corrupt { reason, .. } => reason,
        };

        self.usage.record_corruption();
        log_event(Event::CorruptionDetected, &[("key", key), ("reason", &reason)]);
        self.heal(key)
    }

    /// Restore `key` from its newest valid backup under the write lock.
    ///
    /// The record is loaded again first: a write that committed after the
    /// corrupt read is returned as-is instead of being rolled back.
    fn heal(&self, key: &str) -> StoreResult<ReadOutcome> {
        let _guard = self.lock_writes();
        let reason = match self.load_record(key)? {
            RecordState::Corrupt { reason, .. } => reason,
            RecordState::Valid(record) => {
                return Ok(ReadOutcome {
                    key: key.to_string(),
                    data: Some(record.data),
                    metadata: Some(record.metadata),
                    recovered: false,
                    restored_from: None,
                })
            }
            RecordState::Missing => {
                return Ok(ReadOutcome {
                    key: key.to_string(),
                    data: None,
                    metadata: None,
                    recovered: false,
                    restored_from: None,
                })
            }
        };

        let Some(backup) = self.latest_valid_backup(key)? else {
            return Err(StoreError::corruption(
                key,
                format!("{}; no valid backup available", reason),
            ));
        };

        self.write_locked(key, backup.data.clone(), Operation::Restore, true)?;
        self.usage.record_recovery();
        log_event(
            Event::TransparentRecovery,
            &[("key", key), ("backup_id", &backup.id)],
        );
        self.audit.record(
            SecurityEventType::DataRecovery,
            &format!(
                "Transparently recovered '{}' from backup {} after: {}",
                key, backup.id, reason
            ),
        );

        let metadata = self.verify(key)?.map(|r| r.metadata);
        Ok(ReadOutcome {
            key: key.to_string(),
            data: Some(backup.data),
            metadata,
            recovered: true,
            restored_from: Some(backup.id),
        })
    }

    /// Read `key` and deserialize it
    pub fn read_as<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let outcome = self.read(key)?;
        outcome
            .data
            .map(|data| {
                serde_json::from_value(data).map_err(|e| {
                    StoreError::validation(key, format!("stored data has unexpected shape: {}", e))
                })
            })
            .transpose()
    }

    // =========================================================================
    // Backups
    // =========================================================================

    /// All backups of `key`, newest first
    pub fn get_backup_history(&self, key: &str) -> StoreResult<Vec<Backup>> {
        self.backups.load(key)
    }

    /// Newest backup whose own digests match
    pub fn latest_valid_backup(&self, key: &str) -> StoreResult<Option<Backup>> {
        Ok(self
            .backups
            .load(key)?
            .into_iter()
            .find(|b| b.is_valid()))
    }

    /// Overwrite the current record with a named backup's payload
    pub fn restore(&self, key: &str, backup_id: &str) -> StoreResult<WriteReceipt> {
        Self::check_key(key)?;
        let history = self.backups.load(key)?;
        let backup = history
            .into_iter()
            .find(|b| b.id == backup_id)
            .ok_or_else(|| StoreError::Recovery {
                key: key.to_string(),
                reason: format!("backup '{}' not found", backup_id),
                available_backups: self.backup_summaries(key),
            })?;

        if !backup.is_valid() {
            return Err(StoreError::corruption(
                key,
                format!("backup '{}' failed checksum verification", backup_id),
            ));
        }

        let _guard = self.lock_writes();
        self.write_locked(key, backup.data, Operation::Restore, true)
    }

    /// Summaries of every backup of `key`, newest first
    pub fn backup_summaries(&self, key: &str) -> Vec<BackupSummary> {
        self.backups
            .load(key)
            .map(|history| history.iter().map(Backup::summary).collect())
            .unwrap_or_default()
    }

    /// Prune backups beyond `backup.maxBackups` or older than
    /// `backup.retentionDays`, across all keys
    pub fn cleanup(&self) -> StoreResult<CleanupReport> {
        let config = self.config().backup;
        let cutoff = Utc::now().timestamp_millis() - config.retention_ms();
        let _guard = self.lock_writes();

        let mut report = CleanupReport::default();
        for key in self.backups.keys()? {
            report.keys_scanned += 1;
            let mut history = self.backups.load(&key)?;
            let removed = prune(&mut history, config.max_backups, cutoff);
            if removed > 0 {
                self.backups.save(&key, &history)?;
            }
            report.removed += removed;
            report.remaining += history.len();
        }

        log_event(
            Event::CleanupComplete,
            &[
                ("removed", &report.removed.to_string()),
                ("remaining", &report.remaining.to_string()),
            ],
        );
        Ok(report)
    }

    /// Run `cleanup` every `backup.cleanupIntervalSecs` until stopped.
    ///
    /// The task holds only a weak reference, so dropping the store ends it.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start_maintenance(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config().backup.cleanup_interval();
        let task = PeriodicTask::spawn("backup-cleanup", period, move || {
            if let Some(store) = weak.upgrade() {
                if let Err(e) = store.cleanup() {
                    Logger::error("CLEANUP_FAILED", &[("reason", &e.to_string())]);
                }
            }
        });
        let mut slot = self.maintenance.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(task);
    }

    /// Stop the background cleanup task, if running
    pub fn stop_maintenance(&self) {
        let mut slot = self.maintenance.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut task) = slot.take() {
            task.stop();
        }
    }

    /// Whether the background cleanup task is running
    pub fn maintenance_running(&self) -> bool {
        self.maintenance
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(PeriodicTask::is_running)
            .unwrap_or(false)
    }

    // =========================================================================
    // Enumeration & usage
    // =========================================================================

    /// Logical keys with a current record
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        let keys = self
            .backend
            .keys()
            .map_err(|e| StoreError::from_backend("*", e))?;
        Ok(keys
            .into_iter()
            .filter(|k| !k.starts_with(BACKUP_PREFIX))
            .collect())
    }

    /// Aggregate counters, capacity and backup size histogram
    pub fn usage(&self) -> StoreResult<UsageReport> {
        let current_bytes = self
            .backend
            .used_bytes()
            .map_err(|e| StoreError::from_backend("*", e))?;
        let capacity = self.backend.capacity();

        let mut histogram = SizeHistogram::default();
        let mut backup_count = 0;
        for key in self.backups.keys()? {
            for backup in self.backups.load(&key)? {
                histogram.add(backup.size_bytes());
                backup_count += 1;
            }
        }

        Ok(UsageReport {
            counters: self.usage.counters(),
            current_bytes,
            capacity_bytes: capacity,
            available_bytes: capacity.map(|c| c.saturating_sub(current_bytes)),
            usage_percentage: UsageReport::percentage(current_bytes, capacity),
            key_count: self.keys()?.len(),
            backup_count,
            key_frequency: self.usage.key_frequency(),
            backup_size_histogram: histogram,
        })
    }
}

impl Drop for IntegrityStore {
    fn drop(&mut self) {
        self.stop_maintenance();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemoryAuditSink;
    use serde_json::json;

    fn store_with(backend: Arc<MemoryBackend>) -> IntegrityStore {
        IntegrityStore::new(backend, Config::default()).unwrap()
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let store = IntegrityStore::in_memory();
        let value = json!({"items": [{"id": 1, "title": "a"}], "n": 2.5});
        store.write("tasks", value.clone(), Operation::Create).unwrap();

        let outcome = store.read("tasks").unwrap();
        assert_eq!(outcome.data, Some(value));
        assert!(!outcome.recovered);
    }

    #[test]
    fn test_missing_key_reads_none() {
        let store = IntegrityStore::in_memory();
        let outcome = store.read("nothing").unwrap();
        assert_eq!(outcome.data, None);
    }

    #[test]
    fn test_empty_and_reserved_keys_rejected() {
        let store = IntegrityStore::in_memory();
        let err = store.write("", json!(1), Operation::Create).unwrap_err();
        assert_eq!(err.name(), "ValidationError");

        let reserved = format!("{}x", BACKUP_PREFIX);
        assert!(store.write(&reserved, json!(1), Operation::Create).is_err());
    }

    #[test]
    fn test_first_write_takes_baseline_snapshot() {
        let store = IntegrityStore::in_memory();
        let receipt = store.write("k", json!("v1"), Operation::Create).unwrap();
        let history = store.get_backup_history("k").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(Some(history[0].id.clone()), receipt.backup_id);
        assert_eq!(history[0].data, json!("v1"));
        assert_eq!(history[0].operation, Operation::Create);
    }

    #[test]
    fn test_update_snapshots_prior_value() {
        let store = IntegrityStore::in_memory();
        store.write("k", json!("v1"), Operation::Create).unwrap();
        store.write("k", json!("v2"), Operation::Update).unwrap();

        let history = store.get_backup_history("k").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].data, json!("v1"));
        assert_eq!(history[0].operation, Operation::Update);
    }

    #[test]
    fn test_quota_failure_keeps_prior_value_and_backup() {
        let backend = Arc::new(MemoryBackend::with_quota(2_000));
        let store = store_with(backend);
        store.write("k", json!("small"), Operation::Create).unwrap();
        let before = store.get_backup_history("k").unwrap().len();

        let big = json!("x".repeat(1_500));
        let err = store.write("k", big, Operation::Update).unwrap_err();
        assert_eq!(err.name(), "QuotaExceededError");

        assert_eq!(store.read("k").unwrap().data, Some(json!("small")));
        let history = store.get_backup_history("k").unwrap();
        assert_eq!(history.len(), before + 1);
        assert_eq!(history[0].data, json!("small"));
        assert_eq!(store.usage().unwrap().counters.quota_exceeded_events, 1);
    }

    #[test]
    fn test_rejected_first_write_leaves_no_baseline() {
        let backend = Arc::new(MemoryBackend::with_quota(3_000));
        let store = store_with(backend.clone());

        let err = store
            .write("fresh", json!("x".repeat(1_500)), Operation::Create)
            .unwrap_err();
        assert_eq!(err.name(), "QuotaExceededError");
        assert!(backend.get("fresh").unwrap().is_none());
        assert!(store.get_backup_history("fresh").unwrap().is_empty());

        // nothing stale to restore, and the key can still be created
        store.write("fresh", json!("small"), Operation::Create).unwrap();
        let history = store.get_backup_history("fresh").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].data, json!("small"));
    }

    /// A write committed between detection and restore is kept.
    #[test]
    fn test_heal_keeps_record_rewritten_after_detection() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone());
        store.write("k", json!("v1"), Operation::Create).unwrap();
        let raw = backend.get("k").unwrap().unwrap();
        backend.tamper("k", &raw.replacen("\"checksum\":\"", "\"checksum\":\"QQ", 1));
        assert!(store.verify("k").is_err());

        store.write("k", json!("v2"), Operation::Update).unwrap();
        let backups_before = store.get_backup_history("k").unwrap().len();

        let outcome = store.heal("k").unwrap();
        assert!(!outcome.recovered);
        assert_eq!(outcome.data, Some(json!("v2")));
        assert_eq!(store.get_backup_history("k").unwrap().len(), backups_before);
        assert_eq!(store.usage().unwrap().counters.recovery_events, 0);
    }

    #[test]
    fn test_disabled_backend_surfaces_error() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone());
        backend.set_disabled(true);
        let err = store.write("k", json!(1), Operation::Create).unwrap_err();
        assert_eq!(err.name(), "StorageDisabledError");
    }

    #[test]
    fn test_corrupt_read_recovers_and_audits() {
        let backend = Arc::new(MemoryBackend::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let store = store_with(backend.clone()).with_audit(audit.clone());

        store.write("k", json!({"v": 1}), Operation::Create).unwrap();
        store.write("k", json!({"v": 2}), Operation::Update).unwrap();

        let raw = backend.get("k").unwrap().unwrap();
        backend.tamper("k", &raw.replace("\"v\":2", "\"v\":3"));

        let outcome = store.read("k").unwrap();
        assert!(outcome.recovered);
        assert_eq!(outcome.data, Some(json!({"v": 1})));
        assert_eq!(audit.events_of(SecurityEventType::DataRecovery).len(), 1);

        // healed record now verifies
        assert!(store.verify("k").unwrap().is_some());
        assert_eq!(store.usage().unwrap().counters.corruption_events, 1);
    }

    #[test]
    fn test_unparsable_without_backups_is_corruption_error() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone());
        backend.tamper("k", "{broken");
        let err = store.read("k").unwrap_err();
        assert_eq!(err.name(), "CorruptionError");
    }

    #[test]
    fn test_restore_named_backup() {
        let store = IntegrityStore::in_memory();
        store.write("k", json!("v1"), Operation::Create).unwrap();
        store.write("k", json!("v2"), Operation::Update).unwrap();
        store.write("k", json!("v3"), Operation::Update).unwrap();

        let history = store.get_backup_history("k").unwrap();
        let v2 = history.iter().find(|b| b.data == json!("v2")).unwrap();
        let receipt = store.restore("k", &v2.id).unwrap();
        assert_eq!(receipt.operation, Operation::Restore);
        assert_eq!(store.read("k").unwrap().data, Some(json!("v2")));

        let err = store.restore("k", "backup_missing").unwrap_err();
        assert_eq!(err.name(), "RecoveryError");
        assert!(!err.available_backups().is_empty());
    }

    #[test]
    fn test_remove_keeps_history() {
        let store = IntegrityStore::in_memory();
        store.write("k", json!("v1"), Operation::Create).unwrap();
        assert!(store.remove("k").unwrap());
        assert_eq!(store.read("k").unwrap().data, None);
        let history = store.get_backup_history("k").unwrap();
        assert_eq!(history[0].operation, Operation::Delete);
        assert!(store.keys().unwrap().is_empty());
        assert!(!store.remove("k").unwrap());
    }

    #[test]
    fn test_max_backups_enforced_on_write() {
        let store = IntegrityStore::in_memory();
        store
            .update_config(|c| c.backup.max_backups = 2)
            .unwrap();
        for i in 0..5 {
            store.write("k", json!(i), Operation::Update).unwrap();
        }
        assert_eq!(store.get_backup_history("k").unwrap().len(), 2);
    }

    #[test]
    fn test_update_config_rejects_invalid() {
        let store = IntegrityStore::in_memory();
        assert!(store.update_config(|c| c.backup.max_backups = 0).is_err());
        assert_eq!(store.config().backup.max_backups, 10);
    }

    #[test]
    fn test_usage_report() {
        let store = IntegrityStore::in_memory();
        store.write("a", json!([1, 2, 3]), Operation::Create).unwrap();
        store.write("a", json!([1, 2]), Operation::Update).unwrap();
        store.read("b").unwrap();

        let usage = store.usage().unwrap();
        assert_eq!(usage.counters.total_operations, 3);
        assert_eq!(usage.counters.backup_operations, 2);
        assert_eq!(usage.key_count, 1);
        assert_eq!(usage.backup_count, 2);
        assert_eq!(usage.key_frequency["a"], 2);
        assert_eq!(usage.backup_size_histogram.under_1kb, 2);
        assert!(usage.usage_percentage > 0.0);
        assert_eq!(usage.capacity_bytes, Some(crate::backend::DEFAULT_QUOTA_BYTES));
    }

    #[test]
    fn test_typed_helpers() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Prefs {
            theme: String,
            compact: bool,
        }

        let store = IntegrityStore::in_memory();
        let prefs = Prefs {
            theme: "dark".into(),
            compact: true,
        };
        store.write_as("prefs", &prefs, Operation::Create).unwrap();
        assert_eq!(store.read_as::<Prefs>("prefs").unwrap(), Some(prefs));
        assert!(store.read_as::<Vec<u8>>("prefs").is_err());
    }
}
