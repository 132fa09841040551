//! Health monitor
//!
//! Folds store usage, recovery recommendations and analytics output into
//! one status for external consumers. The status only ever escalates while
//! signals are evaluated:
//!
//! | signal                                   | status   |
//! |------------------------------------------|----------|
//! | usage >= `quota.criticalThreshold`       | critical |
//! | usage >= `quota.warningThreshold`        | warning  |
//! | recovery overall `critical`              | critical |
//! | recovery overall `degraded`              | warning  |
//! | any immediate analytics recommendation   | warning  |
//! | corruption events recorded               | warning  |

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::analytics::AnalyticsEngine;
use crate::errors::StoreResult;
use crate::recovery::{OverallStatus, RecoveryCoordinator, RecoveryRecommendations};
use crate::store::IntegrityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: HealthState,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub usage_percentage: f64,
    /// Milliseconds since the Unix epoch
    pub checked_at: i64,
}

impl HealthStatus {
    fn new(usage_percentage: f64) -> Self {
        Self {
            status: HealthState::Healthy,
            issues: Vec::new(),
            recommendations: Vec::new(),
            usage_percentage,
            checked_at: Utc::now().timestamp_millis(),
        }
    }

    fn raise(&mut self, state: HealthState, issue: String) {
        self.status = self.status.max(state);
        self.issues.push(issue);
    }
}

#[derive(Debug)]
pub struct HealthMonitor {
    store: Arc<IntegrityStore>,
    recovery: Arc<RecoveryCoordinator>,
    analytics: Arc<AnalyticsEngine>,
}

impl HealthMonitor {
    pub fn new(
        store: Arc<IntegrityStore>,
        recovery: Arc<RecoveryCoordinator>,
        analytics: Arc<AnalyticsEngine>,
    ) -> Self {
        Self {
            store,
            recovery,
            analytics,
        }
    }

    /// Evaluate every signal over all stored keys
    pub fn check(&self) -> StoreResult<HealthStatus> {
        let keys = self.store.keys()?;
        let recovery = self.recovery.recommendations(&keys);
        self.evaluate(&recovery)
    }

    /// Evaluate with precomputed recovery recommendations
    pub fn evaluate(&self, recovery: &RecoveryRecommendations) -> StoreResult<HealthStatus> {
        let usage = self.store.usage()?;
        let quota = self.store.config().quota;
        let mut health = HealthStatus::new(usage.usage_percentage);

        if usage.usage_percentage >= quota.critical_threshold {
            health.raise(
                HealthState::Critical,
                format!("Storage usage critical: {:.1}%", usage.usage_percentage),
            );
        } else if usage.usage_percentage >= quota.warning_threshold {
            health.raise(
                HealthState::Warning,
                format!("Storage usage high: {:.1}%", usage.usage_percentage),
            );
        }

        match recovery.overall {
            OverallStatus::Critical => health.raise(
                HealthState::Critical,
                format!(
                    "{} of {} keys failed integrity checks",
                    recovery.invalid_keys, recovery.total_keys
                ),
            ),
            OverallStatus::Degraded => health.raise(
                HealthState::Warning,
                format!(
                    "{} of {} keys failed integrity checks",
                    recovery.invalid_keys, recovery.total_keys
                ),
            ),
            OverallStatus::Healthy => {}
        }
        health.recommendations.extend(
            recovery
                .actions
                .iter()
                .map(|a| format!("{}: {}", a.key, a.action.as_str())),
        );

        let analytics = self.analytics.recommendations()?;
        if !analytics.immediate.is_empty() {
            health.raise(
                HealthState::Warning,
                format!("{} immediate actions recommended", analytics.immediate.len()),
            );
        }
        health.recommendations.extend(analytics.immediate);
        health.recommendations.extend(analytics.short_term);
        health.recommendations.extend(analytics.long_term);

        if usage.counters.corruption_events > 0 {
            health.raise(
                HealthState::Warning,
                format!(
                    "{} corruption events since startup",
                    usage.counters.corruption_events
                ),
            );
        }

        Ok(health)
    }
}
