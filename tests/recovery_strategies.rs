//! Recovery Strategy Tests
//!
//! - auto restores the newest usable backup
//! - conservative refuses to restore over a rule violation
//! - manual never restores
//! - batches account for every key
//! - recommendations classify the keyspace

use std::sync::Arc;

use kvguard::backend::{MemoryBackend, StorageBackend};
use kvguard::config::Config;
use kvguard::observability::{MemoryAuditSink, SecurityEventType};
use kvguard::recovery::{
    OverallStatus, RecommendedAction, RecoveryCoordinator, RecoveryOptions, RecoveryStrategy,
    SessionStatus, Urgency, ValidationRules, NO_RECOVERY_NEEDED,
};
use kvguard::store::{IntegrityStore, Operation};
use kvguard::{OperationResult, StoreError};
use serde_json::json;

// =============================================================================
// Test Utilities
// =============================================================================

struct Harness {
    backend: Arc<MemoryBackend>,
    audit: Arc<MemoryAuditSink>,
    store: Arc<IntegrityStore>,
    coordinator: RecoveryCoordinator,
}

fn harness() -> Harness {
    let backend = Arc::new(MemoryBackend::new());
    let audit = Arc::new(MemoryAuditSink::new());
    let store = Arc::new(
        IntegrityStore::new(backend.clone(), Config::default())
            .unwrap()
            .with_audit(audit.clone()),
    );
    Harness {
        backend,
        audit,
        coordinator: RecoveryCoordinator::new(Arc::clone(&store)),
        store,
    }
}

/// Invalidate the stored checksum of `key` behind the store's back
fn corrupt(backend: &MemoryBackend, key: &str) {
    let raw = backend.get(key).unwrap().expect("key must exist");
    backend.tamper(key, &raw.replacen("\"checksum\":\"", "\"checksum\":\"XX", 1));
}

fn auto() -> RecoveryOptions {
    RecoveryOptions::with_strategy(RecoveryStrategy::Auto)
}

// =============================================================================
// Auto
// =============================================================================

#[test]
fn test_auto_restores_newest_valid_backup() {
    let h = harness();
    h.store.write("tasks", json!(["v1"]), Operation::Create).unwrap();
    h.store.write("tasks", json!(["v2"]), Operation::Update).unwrap();
    let newest = h.store.get_backup_history("tasks").unwrap()[0].clone();
    corrupt(&h.backend, "tasks");

    let outcome = h.coordinator.recover("tasks", auto()).unwrap();
    assert!(outcome.recovered);
    assert_eq!(outcome.restored_from.as_deref(), Some(newest.id.as_str()));
    assert_eq!(outcome.data, Some(newest.data.clone()));

    let read = h.store.read("tasks").unwrap();
    assert!(!read.recovered);
    assert_eq!(read.data, Some(newest.data));
    assert_eq!(h.audit.events_of(SecurityEventType::DataRecovery).len(), 1);
}

#[test]
fn test_auto_on_valid_key_is_a_no_op() {
    let h = harness();
    h.store.write("k", json!({"a": 1}), Operation::Create).unwrap();
    let before = h.store.get_backup_history("k").unwrap().len();

    let outcome = h.coordinator.recover("k", auto()).unwrap();
    assert!(!outcome.recovered);
    assert_eq!(outcome.warnings[0], NO_RECOVERY_NEEDED);
    assert_eq!(h.store.get_backup_history("k").unwrap().len(), before);
}

#[test]
fn test_auto_without_backups_fails() {
    let h = harness();
    h.backend.tamper("orphan", "{not a record");

    let err = h.coordinator.recover("orphan", auto()).unwrap_err();
    assert!(matches!(err, StoreError::Recovery { .. }));
    assert!(err.available_backups().is_empty());
}

/// Recovering a key that never existed reports a RecoveryError.
#[test]
fn test_unknown_key_recovery_result() {
    let h = harness();
    let result: OperationResult<_> = h.coordinator.recover("unknown_key", auto()).into();
    assert!(!result.success);
    assert!(result.data.is_none());
    assert_eq!(result.error.unwrap().name, "RecoveryError");
}

// =============================================================================
// Conservative and manual
// =============================================================================

/// A rule violation blocks conservative recovery but not auto recovery.
#[test]
fn test_conservative_aborts_on_rule_violation() {
    let h = harness();
    h.coordinator
        .register_rules("^tasks$", ValidationRules::new().require("id"))
        .unwrap();
    h.store.write("tasks", json!([{"id": 1}]), Operation::Create).unwrap();
    h.store.write("tasks", json!([{"title": "no id"}]), Operation::Update).unwrap();

    let report = h.coordinator.check_key("tasks");
    assert!(report.is_schema_error());
    assert_eq!(report.recommended_action, RecommendedAction::ManualReview);

    let err = h
        .coordinator
        .recover("tasks", RecoveryOptions::with_strategy(RecoveryStrategy::Conservative))
        .unwrap_err();
    assert_eq!(err.name(), "RecoveryError");
    assert_eq!(h.store.read("tasks").unwrap().data, Some(json!([{"title": "no id"}])));

    let outcome = h.coordinator.recover("tasks", auto()).unwrap();
    assert!(outcome.recovered);
    assert_eq!(h.store.read("tasks").unwrap().data, Some(json!([{"id": 1}])));
}

#[test]
fn test_conservative_restores_checksum_failures() {
    let h = harness();
    h.store.write("k", json!("v1"), Operation::Create).unwrap();
    corrupt(&h.backend, "k");

    let outcome = h
        .coordinator
        .recover("k", RecoveryOptions::with_strategy(RecoveryStrategy::Conservative))
        .unwrap();
    assert!(outcome.recovered);
    assert_eq!(h.store.read("k").unwrap().data, Some(json!("v1")));
}

#[test]
fn test_manual_never_restores() {
    let h = harness();
    h.store.write("k", json!("v1"), Operation::Create).unwrap();
    corrupt(&h.backend, "k");

    let err = h
        .coordinator
        .recover("k", RecoveryOptions::with_strategy(RecoveryStrategy::Manual))
        .unwrap_err();
    assert!(err.to_string().contains("manual recovery requires user intervention"));
    assert!(!err.available_backups().is_empty());
    assert!(h.store.verify("k").is_err());
    assert!(h.audit.events_of(SecurityEventType::DataRecovery).is_empty());
}

// =============================================================================
// Batches
// =============================================================================

/// recovered + failed == total, with valid keys counted as recovered.
#[test]
fn test_batch_accounts_for_every_key() {
    let h = harness();
    h.store.write("a", json!(1), Operation::Create).unwrap();
    h.store.write("b", json!(2), Operation::Create).unwrap();
    corrupt(&h.backend, "a");

    let session = h
        .coordinator
        .batch_recover(&["a", "b", "missing"], auto())
        .unwrap();

    assert_eq!(session.summary.total, 3);
    assert_eq!(session.summary.recovered, 2);
    assert_eq!(session.summary.failed, 1);
    assert_eq!(
        session.summary.recovered + session.summary.failed,
        session.summary.total
    );
    assert!(session.failures.contains_key("missing"));
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.keys_processed, vec!["a", "b", "missing"]);
    assert!(h.coordinator.get_session(&session.id).is_none());
}

#[test]
fn test_clean_batch_completes() {
    let h = harness();
    for key in ["x", "y"] {
        h.store.write(key, json!(key), Operation::Create).unwrap();
        corrupt(&h.backend, key);
    }

    let session = h.coordinator.batch_recover(&["x", "y"], auto()).unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.summary.recovered, 2);
    assert!(session.end_time.is_some());
}

#[test]
fn test_cancelled_session_fails_remaining_keys() {
    let h = harness();
    let id = h.coordinator.start_session(&["a", "b", "c"]);
    assert!(h.coordinator.get_session(&id).is_some());
    assert!(h.coordinator.cancel_session(&id));

    let session = h.coordinator.run_session(&id, auto()).unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert_eq!(session.summary.failed, 3);
    assert!(session.failures.values().all(|reason| reason == "cancelled"));
    assert!(h.coordinator.get_session(&id).is_none());
    assert!(!h.coordinator.cancel_session(&id));
}

// =============================================================================
// Recommendations
// =============================================================================

/// Seven valid keys and three corrupt ones with backups is degraded.
#[test]
fn test_partial_corruption_is_degraded() {
    let h = harness();
    let keys: Vec<String> = (0..10).map(|i| format!("key{}", i)).collect();
    for key in &keys {
        h.store.write(key, json!({"n": key}), Operation::Create).unwrap();
    }
    for key in &keys[7..] {
        corrupt(&h.backend, key);
    }

    let recs = h.coordinator.recommendations(&keys);
    assert_eq!(recs.total_keys, 10);
    assert_eq!(recs.invalid_keys, 3);
    assert_eq!(recs.overall, OverallStatus::Degraded);
    assert_eq!(recs.urgency, Urgency::Medium);
    assert_eq!(recs.actions.len(), 3);
    assert!(recs
        .actions
        .iter()
        .all(|a| a.action == RecommendedAction::RestoreBackup));
}

#[test]
fn test_missing_keys_need_manual_review() {
    let h = harness();
    let recs = h.coordinator.recommendations(&["ghost"]);
    assert_eq!(recs.overall, OverallStatus::Critical);
    assert_eq!(recs.urgency, Urgency::High);
    assert_eq!(recs.reports[0].errors, vec!["no data found"]);
    assert_eq!(recs.actions[0].action, RecommendedAction::ManualReview);
}

#[test]
fn test_restore_unknown_backup_lists_alternatives() {
    let h = harness();
    h.store.write("k", json!(1), Operation::Create).unwrap();
    h.store.write("k", json!(2), Operation::Update).unwrap();

    let err = h.store.restore("k", "backup_0_deadbeef").unwrap_err();
    assert_eq!(err.name(), "RecoveryError");
    assert_eq!(err.available_backups().len(), 2);
}
