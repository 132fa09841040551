//! Usage analytics for kvguard
//!
//! - `trend`: samples and the calculations over them
//! - `engine`: sampling, retention, recommendations, predictions

mod engine;
mod trend;

pub use engine::{
    AnalyticsEngine, AnalyticsRecommendations, AnalyticsSummary, GrowthPrediction, HotKey,
    UsagePatterns, KEY_FANOUT_THRESHOLD, LONG_TERM_GROWTH_BYTES_PER_DAY, OPERATING_OPTIMALLY,
    SHORT_TERM_GROWTH_BYTES_PER_DAY,
};
pub use trend::{
    bursts, confidence, growth_rate, peak_hours, Burst, PeakHour, TrendSnapshot, MAX_CONFIDENCE,
    TOP_BURSTS, TOP_PEAK_HOURS,
};
