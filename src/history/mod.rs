//! Read-side projections over the stored state events.
//!
//! Nothing here touches the store; callers fetch events and hand them in
//! together with the instant they consider "now".

pub mod aggregate;
pub mod export;
pub mod reconcile;
pub mod timeline;

use chrono::{DateTime, Utc};

pub use aggregate::{
    Aggregator, DailyBucket, HourlyBucket, PeriodSummary, StateCounts, StatePercentages,
    StateSeconds, SummaryStats,
};
pub use export::export_csv;
pub use reconcile::{reconcile, ReconciledEvent};
pub use timeline::{build_timeline, Interval};

/// Non-negative seconds from `start` to `end`, at microsecond resolution.
pub fn secs_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    if end <= start {
        return 0.0;
    }
    match (end - start).num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => (end - start).num_milliseconds() as f64 / 1_000.0,
    }
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
