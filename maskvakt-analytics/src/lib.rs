//! # maskvakt-analytics
//!
//! Aggregate statistics over stored detection results, with a short-lived
//! per-period snapshot cache.

pub mod aggregator;
pub mod error;
pub mod period;
pub mod snapshot;

pub use aggregator::{AnalyticsAggregator, CacheStats, LiveCounters};
pub use error::AnalyticsError;
pub use period::Period;
pub use snapshot::{
    ActivitySummary, AlertBreakdown, AnalyticsSnapshot, DailyTrend, ExportFormat, HourlyBreakdown,
    SourceBreakdown, Summary,
};
