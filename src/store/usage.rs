//! Usage counters for the integrity store
//!
//! Counters are monotonic for the life of the store and use atomics so the
//! analytics sampler can read them while writes are in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Live counters owned by the store
#[derive(Debug, Default)]
pub struct UsageTracker {
    total_operations: AtomicU64,
    backup_operations: AtomicU64,
    corruption_events: AtomicU64,
    quota_exceeded_events: AtomicU64,
    recovery_events: AtomicU64,
    key_frequency: Mutex<HashMap<String, u64>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one operation against `key`
    pub fn record_operation(&self, key: &str) {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        let mut freq = self.key_frequency.lock().unwrap_or_else(|e| e.into_inner());
        *freq.entry(key.to_string()).or_insert(0) += 1;
    }

    pub fn record_backup(&self) {
        self.backup_operations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_corruption(&self) {
        self.corruption_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_quota_exceeded(&self) {
        self.quota_exceeded_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recovery(&self) {
        self.recovery_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_operations(&self) -> u64 {
        self.total_operations.load(Ordering::Relaxed)
    }

    pub fn corruption_events(&self) -> u64 {
        self.corruption_events.load(Ordering::Relaxed)
    }

    pub fn quota_exceeded_events(&self) -> u64 {
        self.quota_exceeded_events.load(Ordering::Relaxed)
    }

    /// Counter values at this instant
    pub fn counters(&self) -> UsageCounters {
        UsageCounters {
            total_operations: self.total_operations.load(Ordering::Relaxed),
            backup_operations: self.backup_operations.load(Ordering::Relaxed),
            corruption_events: self.corruption_events.load(Ordering::Relaxed),
            quota_exceeded_events: self.quota_exceeded_events.load(Ordering::Relaxed),
            recovery_events: self.recovery_events.load(Ordering::Relaxed),
        }
    }

    pub fn key_frequency(&self) -> HashMap<String, u64> {
        self.key_frequency
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Snapshot of the monotonic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCounters {
    pub total_operations: u64,
    pub backup_operations: u64,
    pub corruption_events: u64,
    pub quota_exceeded_events: u64,
    pub recovery_events: u64,
}

/// Backup counts by payload size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeHistogram {
    #[serde(rename = "<1KB")]
    pub under_1kb: u64,
    #[serde(rename = "1-10KB")]
    pub kb_1_to_10: u64,
    #[serde(rename = "10-100KB")]
    pub kb_10_to_100: u64,
    #[serde(rename = ">100KB")]
    pub over_100kb: u64,
}

impl SizeHistogram {
    pub fn add(&mut self, size_bytes: u64) {
        match size_bytes {
            s if s < 1024 => self.under_1kb += 1,
            s if s < 10 * 1024 => self.kb_1_to_10 += 1,
            s if s < 100 * 1024 => self.kb_10_to_100 += 1,
            _ => self.over_100kb += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.under_1kb + self.kb_1_to_10 + self.kb_10_to_100 + self.over_100kb
    }
}

/// Aggregate usage returned by `IntegrityStore::usage`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    #[serde(flatten)]
    pub counters: UsageCounters,
    pub current_bytes: u64,
    /// `None` for unbounded backends
    pub capacity_bytes: Option<u64>,
    pub available_bytes: Option<u64>,
    /// 0 for unbounded backends
    pub usage_percentage: f64,
    pub key_count: usize,
    pub backup_count: usize,
    pub key_frequency: HashMap<String, u64>,
    pub backup_size_histogram: SizeHistogram,
}

impl UsageReport {
    /// Compute percentage of capacity in use
    pub fn percentage(current: u64, capacity: Option<u64>) -> f64 {
        match capacity {
            Some(cap) if cap > 0 => (current as f64 / cap as f64) * 100.0,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_frequency() {
        let tracker = UsageTracker::new();
        tracker.record_operation("tasks");
        tracker.record_operation("tasks");
        tracker.record_operation("prefs");
        assert_eq!(tracker.total_operations(), 3);
        assert_eq!(tracker.key_frequency()["tasks"], 2);
    }

    #[test]
    fn test_counters_snapshot() {
        let tracker = UsageTracker::new();
        tracker.record_backup();
        tracker.record_corruption();
        tracker.record_quota_exceeded();
        let c = tracker.counters();
        assert_eq!(c.backup_operations, 1);
        assert_eq!(c.corruption_events, 1);
        assert_eq!(c.quota_exceeded_events, 1);
        assert_eq!(c.recovery_events, 0);
    }

    #[test]
    fn test_histogram_buckets() {
        let mut h = SizeHistogram::default();
        h.add(10);
        h.add(1024);
        h.add(50 * 1024);
        h.add(1024 * 1024);
        assert_eq!((h.under_1kb, h.kb_1_to_10, h.kb_10_to_100, h.over_100kb), (1, 1, 1, 1));
        assert_eq!(h.total(), 4);

        let json = serde_json::to_value(h).unwrap();
        assert_eq!(json["<1KB"], 1);
    }

    #[test]
    fn test_percentage() {
        assert_eq!(UsageReport::percentage(50, Some(200)), 25.0);
        assert_eq!(UsageReport::percentage(50, None), 0.0);
    }
}
