//! Trend samples and the pure calculations over them
//!
//! All functions take samples ordered oldest-first.

use std::collections::BTreeMap;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MS_PER_DAY;

/// One periodic usage sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendSnapshot {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Bytes in use
    pub usage: u64,
    /// Cumulative operation count
    pub operations: u64,
    /// Cumulative corruption + quota-exceeded events
    pub errors: u64,
    /// Backups held
    pub backups: u64,
}

/// Average usage within one hour of the day (UTC)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakHour {
    pub hour: u32,
    pub average_usage: f64,
    pub samples: usize,
}

/// Operation rate between two consecutive samples above the burst threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Burst {
    /// Timestamp of the later sample
    pub timestamp: i64,
    pub operations_per_minute: f64,
}

/// Peak hours kept by `peak_hours`
pub const TOP_PEAK_HOURS: usize = 5;
/// Bursts kept by `bursts`
pub const TOP_BURSTS: usize = 10;
/// Sample count at which confidence stops growing linearly
pub const CONFIDENCE_SAMPLES: usize = 50;
/// Confidence ceiling
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Bytes per day between the oldest and newest sample
pub fn growth_rate(history: &[TrendSnapshot]) -> f64 {
    let (Some(oldest), Some(newest)) = (history.first(), history.last()) else {
        return 0.0;
    };
    if history.len() < 2 {
        return 0.0;
    }
    let days = (newest.timestamp - oldest.timestamp) as f64 / MS_PER_DAY as f64;
    if days <= 0.0 {
        return 0.0;
    }
    (newest.usage as f64 - oldest.usage as f64) / days
}

/// Hours of the day with the highest average usage
pub fn peak_hours(history: &[TrendSnapshot], top: usize) -> Vec<PeakHour> {
    let mut buckets: BTreeMap<u32, (u64, usize)> = BTreeMap::new();
    for snapshot in history {
        let Some(at) = DateTime::<Utc>::from_timestamp_millis(snapshot.timestamp) else {
            continue;
        };
        let bucket = buckets.entry(at.hour()).or_insert((0, 0));
        bucket.0 += snapshot.usage;
        bucket.1 += 1;
    }

    let mut hours: Vec<PeakHour> = buckets
        .into_iter()
        .map(|(hour, (total, samples))| PeakHour {
            hour,
            average_usage: total as f64 / samples as f64,
            samples,
        })
        .collect();
    hours.sort_by(|a, b| {
        b.average_usage
            .total_cmp(&a.average_usage)
            .then_with(|| a.hour.cmp(&b.hour))
    });
    hours.truncate(top);
    hours
}

/// Consecutive-sample rates above `threshold` operations per minute,
/// largest first
pub fn bursts(history: &[TrendSnapshot], threshold: f64, top: usize) -> Vec<Burst> {
    let mut found: Vec<Burst> = history
        .windows(2)
        .filter_map(|pair| {
            let minutes = (pair[1].timestamp - pair[0].timestamp) as f64 / 60_000.0;
            if minutes <= 0.0 {
                return None;
            }
            let ops = pair[1].operations.saturating_sub(pair[0].operations) as f64;
            let rate = ops / minutes;
            (rate > threshold).then_some(Burst {
                timestamp: pair[1].timestamp,
                operations_per_minute: rate,
            })
        })
        .collect();
    found.sort_by(|a, b| b.operations_per_minute.total_cmp(&a.operations_per_minute));
    found.truncate(top);
    found
}

/// Prediction confidence for `samples` retained samples
pub fn confidence(samples: usize) -> f64 {
    (samples as f64 / CONFIDENCE_SAMPLES as f64).min(MAX_CONFIDENCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = 3_600_000;

    fn snap(timestamp: i64, usage: u64, operations: u64) -> TrendSnapshot {
        TrendSnapshot {
            timestamp,
            usage,
            operations,
            errors: 0,
            backups: 0,
        }
    }

    #[test]
    fn test_growth_rate() {
        assert_eq!(growth_rate(&[]), 0.0);
        assert_eq!(growth_rate(&[snap(0, 100, 0)]), 0.0);

        let history = [snap(0, 1_000, 0), snap(MS_PER_DAY, 1_500, 0), snap(2 * MS_PER_DAY, 3_000, 0)];
        assert_eq!(growth_rate(&history), 1_000.0);

        let shrinking = [snap(0, 3_000, 0), snap(MS_PER_DAY, 1_000, 0)];
        assert_eq!(growth_rate(&shrinking), -2_000.0);
    }

    #[test]
    fn test_peak_hours_ranked_by_average() {
        let history = [
            snap(HOUR_MS, 100, 0),
            snap(HOUR_MS + 60_000, 300, 0),
            snap(5 * HOUR_MS, 500, 0),
            snap(7 * HOUR_MS, 50, 0),
        ];
        let peaks = peak_hours(&history, 2);
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].hour, 5);
        assert_eq!(peaks[1].hour, 1);
        assert_eq!(peaks[1].average_usage, 200.0);
        assert_eq!(peaks[1].samples, 2);
    }

    #[test]
    fn test_bursts_above_threshold() {
        let history = [
            snap(0, 0, 0),
            snap(60_000, 0, 50),
            snap(120_000, 0, 450),
            snap(180_000, 0, 650),
        ];
        let found = bursts(&history, 100.0, 10);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].operations_per_minute, 400.0);
        assert_eq!(found[0].timestamp, 120_000);
        assert_eq!(found[1].operations_per_minute, 200.0);

        assert_eq!(bursts(&history, 100.0, 1).len(), 1);
    }

    #[test]
    fn test_confidence_capped() {
        assert_eq!(confidence(0), 0.0);
        assert_eq!(confidence(25), 0.5);
        assert_eq!(confidence(1_000), MAX_CONFIDENCE);
    }
}
