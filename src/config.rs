//! kvguard configuration
//!
//! Configuration is a tree of serde structs. Every field has a default, so
//! a config file only needs the values it changes:
//!
//! ```json
//! {
//!   "backup": { "maxBackups": 5 },
//!   "quota": { "warningThreshold": 70 }
//! }
//! ```
//!
//! The store keeps its configuration behind a lock and exposes
//! `update_config` for runtime changes.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{StoreError, StoreResult};

/// Root configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

/// `storage.*`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Run structural validation in integrity checks and recovery
    #[serde(default = "default_true")]
    pub enable_validation: bool,

    /// Quota for file-backed stores; `None` means unbounded
    #[serde(default)]
    pub quota_bytes: Option<u64>,
}

/// `backup.*`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfig {
    /// Backups kept per key (default: 10)
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,

    /// Backups older than this are pruned (default: 30 days)
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Interval of the background cleanup task (default: 1 hour)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

/// `quota.*`, as percentages of backend capacity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaConfig {
    /// Usage percentage that raises a warning (default: 75)
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,

    /// Usage percentage considered critical (default: 90)
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: f64,
}

/// `analytics.*`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsConfig {
    /// Sampling interval (default: 5 minutes)
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,

    /// Pruning interval (default: 1 hour)
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,

    /// Trend samples older than this are pruned (default: 7 days)
    #[serde(default = "default_analytics_retention_days")]
    pub retention_days: u32,

    /// Hard cap on retained samples (default: 1000)
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: usize,

    /// Operations per minute counted as a burst (default: 100)
    #[serde(default = "default_burst_threshold")]
    pub burst_threshold: f64,
}

fn default_true() -> bool {
    true
}
fn default_max_backups() -> usize {
    10
}
fn default_retention_days() -> u32 {
    30
}
fn default_cleanup_interval_secs() -> u64 {
    3600
}
fn default_warning_threshold() -> f64 {
    75.0
}
fn default_critical_threshold() -> f64 {
    90.0
}
fn default_sample_interval_secs() -> u64 {
    300
}
fn default_prune_interval_secs() -> u64 {
    3600
}
fn default_analytics_retention_days() -> u32 {
    7
}
fn default_max_snapshots() -> usize {
    1000
}
fn default_burst_threshold() -> f64 {
    100.0
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enable_validation: default_true(),
            quota_bytes: None,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            max_backups: default_max_backups(),
            retention_days: default_retention_days(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            warning_threshold: default_warning_threshold(),
            critical_threshold: default_critical_threshold(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: default_sample_interval_secs(),
            prune_interval_secs: default_prune_interval_secs(),
            retention_days: default_analytics_retention_days(),
            max_snapshots: default_max_snapshots(),
            burst_threshold: default_burst_threshold(),
        }
    }
}

impl BackupConfig {
    /// Retention window in milliseconds
    pub fn retention_ms(&self) -> i64 {
        i64::from(self.retention_days) * MS_PER_DAY
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl AnalyticsConfig {
    /// Retention window in milliseconds
    pub fn retention_ms(&self) -> i64 {
        i64::from(self.retention_days) * MS_PER_DAY
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }
}

/// Milliseconds in a day
pub const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

impl Config {
    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> StoreResult<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| StoreError::validation("config", format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; a missing file yields the defaults
    pub fn load(path: &Path) -> StoreResult<Self> {
        match fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(StoreError::validation(
                "config",
                format!("cannot read {}: {}", path.display(), e),
            )),
        }
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> StoreResult<()> {
        let mut errors = Vec::new();

        if self.backup.max_backups == 0 {
            errors.push("backup.maxBackups must be at least 1".to_string());
        }
        let q = &self.quota;
        if !(0.0..=100.0).contains(&q.warning_threshold)
            || !(0.0..=100.0).contains(&q.critical_threshold)
        {
            errors.push("quota thresholds must be between 0 and 100".to_string());
        }
        if q.warning_threshold >= q.critical_threshold {
            errors.push("quota.warningThreshold must be below quota.criticalThreshold".to_string());
        }
        if self.analytics.max_snapshots == 0 {
            errors.push("analytics.maxSnapshots must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Validation {
                key: "config".to_string(),
                errors,
            })
        }
    }
}
