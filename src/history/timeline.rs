use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::TimelineState;

use super::{reconcile::ReconciledEvent, secs_between};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub state: TimelineState,
    pub duration_secs: f64,
}

impl Interval {
    fn new(start: DateTime<Utc>, end: DateTime<Utc>, state: TimelineState) -> Self {
        Self {
            start,
            end,
            state,
            duration_secs: secs_between(start, end),
        }
    }

    /// Portion of this interval inside `[start, end)`, if any.
    pub fn clip(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Interval> {
        let from = self.start.max(start);
        let to = self.end.min(end);
        (from < to).then(|| Interval::new(from, to, self.state))
    }
}

/// Tile `[window_start, window_end]` with the reconciled events, filling
/// every uncovered stretch with a `NoData` interval.
///
/// Events must be ordered oldest first. An event that started before the
/// window contributes from `window_start`; an event still open at `now`
/// ends there, and anything after it up to `window_end` is `NoData`.
/// Zero-length pieces are dropped.
pub fn build_timeline(
    events: &[ReconciledEvent],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<Interval> {
    let mut intervals = Vec::new();
    if window_start >= window_end {
        return intervals;
    }

    let mut cursor = window_start;
    for event in events {
        if cursor >= window_end {
            break;
        }

        let start = event.timestamp.max(window_start);
        let end = event.end.min(window_end);
        if end <= start.max(cursor) {
            continue;
        }

        if start > cursor {
            intervals.push(Interval::new(cursor, start, TimelineState::NoData));
            cursor = start;
        }

        intervals.push(Interval::new(cursor, end, event.state.into()));
        cursor = end;
    }

    if cursor < window_end {
        intervals.push(Interval::new(cursor, window_end, TimelineState::NoData));
    }

    intervals
}
