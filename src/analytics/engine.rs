//! Analytics engine
//!
//! Samples the store's usage into a capped, time-windowed history and
//! derives growth rate, hot keys, usage patterns, recommendations and growth
//! predictions from it.
//!
//! Sampling and pruning run as two owned background tasks started with
//! [`AnalyticsEngine::start`] and ended by [`AnalyticsEngine::stop`] or by
//! dropping the engine.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock, Weak};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::MS_PER_DAY;
use crate::errors::StoreResult;
use crate::observability::{log_event, Event, Logger};
use crate::store::IntegrityStore;
use crate::task::PeriodicTask;

use super::trend::{
    bursts, confidence, growth_rate, peak_hours, Burst, PeakHour, TrendSnapshot, TOP_BURSTS,
    TOP_PEAK_HOURS,
};

/// Growth above this many bytes/day earns a long-term recommendation
pub const LONG_TERM_GROWTH_BYTES_PER_DAY: f64 = 100.0 * 1024.0;
/// Growth above this many bytes/day earns a short-term recommendation
pub const SHORT_TERM_GROWTH_BYTES_PER_DAY: f64 = 1024.0 * 1024.0;
/// Key counts above this earn a fan-out recommendation
pub const KEY_FANOUT_THRESHOLD: usize = 50;
/// Fallback when nothing trips a threshold
pub const OPERATING_OPTIMALLY: &str = "Storage is operating optimally";
/// Predicted exhaustion beyond this horizon is not reported
const PREDICTION_HORIZON_DAYS: f64 = 365.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotKey {
    pub key: String,
    pub operations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsagePatterns {
    pub peak_hours: Vec<PeakHour>,
    pub bursts: Vec<Burst>,
    pub hot_keys: Vec<HotKey>,
}

/// Recommendations bucketed by how soon they should be acted on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRecommendations {
    pub immediate: Vec<String>,
    pub short_term: Vec<String>,
    pub long_term: Vec<String>,
}

impl AnalyticsRecommendations {
    pub fn is_empty(&self) -> bool {
        self.immediate.is_empty() && self.short_term.is_empty() && self.long_term.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthPrediction {
    pub days: u32,
    pub current_usage: u64,
    pub predicted_usage: u64,
    /// Bytes per day
    pub growth_rate: f64,
    /// Milliseconds since the Unix epoch; only set within one year
    pub quota_exhaustion_date: Option<i64>,
    pub confidence: f64,
}

/// Everything the engine knows, in one value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub samples: usize,
    pub growth_rate: f64,
    pub patterns: UsagePatterns,
    pub recommendations: AnalyticsRecommendations,
}

pub struct AnalyticsEngine {
    store: Arc<IntegrityStore>,
    history: RwLock<VecDeque<TrendSnapshot>>,
    tasks: Mutex<Vec<PeriodicTask>>,
}

impl std::fmt::Debug for AnalyticsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsEngine")
            .field("samples", &self.len())
            .finish_non_exhaustive()
    }
}

impl AnalyticsEngine {
    pub fn new(store: Arc<IntegrityStore>) -> Self {
        Self {
            store,
            history: RwLock::new(VecDeque::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    // =========================================================================
    // History
    // =========================================================================

    /// Take a sample now
    pub fn sample(&self) -> StoreResult<TrendSnapshot> {
        self.sample_at(Utc::now().timestamp_millis())
    }

    /// Take a sample stamped `timestamp`
    pub fn sample_at(&self, timestamp: i64) -> StoreResult<TrendSnapshot> {
        let usage = self.store.usage()?;
        let snapshot = TrendSnapshot {
            timestamp,
            usage: usage.current_bytes,
            operations: usage.counters.total_operations,
            errors: usage.counters.corruption_events + usage.counters.quota_exceeded_events,
            backups: usage.backup_count as u64,
        };
        self.push_snapshot(snapshot);

        log_event(
            Event::AnalyticsSample,
            &[
                ("usage", &snapshot.usage.to_string()),
                ("operations", &snapshot.operations.to_string()),
            ],
        );
        Ok(snapshot)
    }

    /// Insert a sample in timestamp order, evicting the oldest past the cap
    pub fn push_snapshot(&self, snapshot: TrendSnapshot) {
        let cap = self.store.config().analytics.max_snapshots.max(1);
        let mut history = self.history.write().unwrap_or_else(|e| e.into_inner());
        let at = history.partition_point(|s| s.timestamp <= snapshot.timestamp);
        history.insert(at, snapshot);
        while history.len() > cap {
            history.pop_front();
        }
    }

    /// Replace the history, e.g. from an import package
    pub fn import_history(&self, snapshots: Vec<TrendSnapshot>) {
        self.history
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        for snapshot in snapshots {
            self.push_snapshot(snapshot);
        }
    }

    /// Samples, oldest first
    pub fn history(&self) -> Vec<TrendSnapshot> {
        self.history
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.history.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop samples older than the retention window
    pub fn prune(&self) -> usize {
        let cutoff = Utc::now().timestamp_millis() - self.store.config().analytics.retention_ms();
        self.prune_before(cutoff)
    }

    /// Drop samples stamped before `cutoff`
    pub fn prune_before(&self, cutoff: i64) -> usize {
        let mut history = self.history.write().unwrap_or_else(|e| e.into_inner());
        let before = history.len();
        history.retain(|s| s.timestamp >= cutoff);
        let removed = before - history.len();
        drop(history);

        if removed > 0 {
            log_event(Event::AnalyticsPrune, &[("removed", &removed.to_string())]);
        }
        removed
    }

    // =========================================================================
    // Derived views
    // =========================================================================

    /// Bytes per day over the retained history
    pub fn growth_rate(&self) -> f64 {
        growth_rate(&self.history())
    }

    /// Top `n` keys by operation count
    pub fn hot_keys(&self, n: usize) -> Vec<HotKey> {
        let mut keys: Vec<HotKey> = self
            .store
            .usage_tracker()
            .key_frequency()
            .into_iter()
            .map(|(key, operations)| HotKey { key, operations })
            .collect();
        keys.sort_by(|a, b| b.operations.cmp(&a.operations).then_with(|| a.key.cmp(&b.key)));
        keys.truncate(n);
        keys
    }

    pub fn patterns(&self) -> UsagePatterns {
        let history = self.history();
        let threshold = self.store.config().analytics.burst_threshold;
        UsagePatterns {
            peak_hours: peak_hours(&history, TOP_PEAK_HOURS),
            bursts: bursts(&history, threshold, TOP_BURSTS),
            hot_keys: self.hot_keys(10),
        }
    }

    pub fn recommendations(&self) -> StoreResult<AnalyticsRecommendations> {
        let usage = self.store.usage()?;
        let quota = self.store.config().quota;
        let rate = self.growth_rate();
        let mut recs = AnalyticsRecommendations::default();

        if usage.usage_percentage >= quota.critical_threshold {
            recs.immediate.push(format!(
                "Storage usage at {:.1}% is above the critical threshold; run cleanup or export old data",
                usage.usage_percentage
            ));
        } else if usage.usage_percentage >= quota.warning_threshold {
            recs.short_term.push(format!(
                "Storage usage at {:.1}% is above the warning threshold; reduce backup retention",
                usage.usage_percentage
            ));
        }

        if usage.counters.corruption_events > 0 {
            recs.immediate.push(format!(
                "{} corruption events detected; run an integrity check",
                usage.counters.corruption_events
            ));
        }
        if usage.counters.quota_exceeded_events > 0 {
            recs.immediate.push(format!(
                "{} writes rejected for quota; free space before further writes",
                usage.counters.quota_exceeded_events
            ));
        }

        if rate > SHORT_TERM_GROWTH_BYTES_PER_DAY {
            recs.short_term.push(format!(
                "Storage is growing {:.0} KiB/day; review what is being stored",
                rate / 1024.0
            ));
        } else if rate > LONG_TERM_GROWTH_BYTES_PER_DAY {
            recs.long_term.push(format!(
                "Storage is growing {:.0} KiB/day; plan for archiving",
                rate / 1024.0
            ));
        }

        if usage.key_count > KEY_FANOUT_THRESHOLD {
            recs.long_term.push(format!(
                "{} keys in use; consider consolidating related data",
                usage.key_count
            ));
        }

        if recs.is_empty() {
            recs.long_term.push(OPERATING_OPTIMALLY.to_string());
        }
        Ok(recs)
    }

    /// Linear projection of usage `days` ahead
    pub fn growth_prediction(&self, days: u32) -> StoreResult<GrowthPrediction> {
        let usage = self.store.usage()?;
        let history = self.history();
        let rate = growth_rate(&history);

        let projected = usage.current_bytes as f64 + rate * f64::from(days);
        let quota_exhaustion_date = match usage.capacity_bytes {
            Some(capacity) if rate > 0.0 => {
                let remaining = capacity.saturating_sub(usage.current_bytes) as f64;
                let days_to_full = remaining / rate;
                (days_to_full <= PREDICTION_HORIZON_DAYS).then(|| {
                    Utc::now().timestamp_millis() + (days_to_full * MS_PER_DAY as f64) as i64
                })
            }
            _ => None,
        };

        Ok(GrowthPrediction {
            days,
            current_usage: usage.current_bytes,
            predicted_usage: projected.max(0.0) as u64,
            growth_rate: rate,
            quota_exhaustion_date,
            confidence: confidence(history.len()),
        })
    }

    pub fn summary(&self) -> StoreResult<AnalyticsSummary> {
        Ok(AnalyticsSummary {
            samples: self.len(),
            growth_rate: self.growth_rate(),
            patterns: self.patterns(),
            recommendations: self.recommendations()?,
        })
    }

    // =========================================================================
    // Background tasks
    // =========================================================================

    /// Start sampling and pruning on the configured intervals. Restarts the
    /// tasks if they are already running.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(self: &Arc<Self>) {
        self.stop();
        let config = self.store.config().analytics;

        let weak: Weak<Self> = Arc::downgrade(self);
        let sampler = PeriodicTask::spawn("analytics-sample", config.sample_interval(), move || {
            if let Some(engine) = weak.upgrade() {
                if let Err(e) = engine.sample() {
                    Logger::error("ANALYTICS_SAMPLE_FAILED", &[("reason", &e.to_string())]);
                }
            }
        });

        let weak: Weak<Self> = Arc::downgrade(self);
        let pruner = PeriodicTask::spawn("analytics-prune", config.prune_interval(), move || {
            if let Some(engine) = weak.upgrade() {
                engine.prune();
            }
        });

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.push(sampler);
        tasks.push(pruner);
    }

    pub fn stop(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for task in tasks.iter_mut() {
            task.stop();
        }
        tasks.clear();
    }

    pub fn is_running(&self) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(PeriodicTask::is_running)
    }
}

impl Drop for AnalyticsEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
