use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::StateEvent;
use crate::models::MachineState;

use super::secs_between;

/// A stored event with its read-time duration filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledEvent {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    /// Start of the next event, or "now" for the latest one.
    pub end: DateTime<Utc>,
    pub state: MachineState,
    pub tag_id: Option<i64>,
    pub description: String,
    pub duration_secs: f64,
}

/// Derive each event's duration from the spacing to its successor.
///
/// `events` must be ordered oldest first. `following` is the first stored
/// event after the slice, if the slice is a window onto a longer history;
/// without it the last event runs until `now`.
pub fn reconcile(
    events: &[StateEvent],
    following: Option<&StateEvent>,
    now: DateTime<Utc>,
) -> Vec<ReconciledEvent> {
    events
        .iter()
        .enumerate()
        .map(|(index, event)| {
            let next_start = events
                .get(index + 1)
                .or(following)
                .map(|next| next.timestamp)
                .unwrap_or(now);
            let end = next_start.max(event.timestamp);

            ReconciledEvent {
                id: event.id,
                timestamp: event.timestamp,
                end,
                state: event.state,
                tag_id: event.tag_id,
                description: event.description.clone(),
                duration_secs: secs_between(event.timestamp, end),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 13, 14, 0, 0).unwrap()
    }

    fn stored(id: i64, offset_secs: i64, state: MachineState) -> StateEvent {
        StateEvent {
            id,
            timestamp: t0() + Duration::seconds(offset_secs),
            state,
            tag_id: None,
            description: String::new(),
        }
    }

    #[test]
    fn durations_follow_event_spacing() {
        let events = vec![
            stored(1, 0, MachineState::Running),
            stored(2, 300, MachineState::Idle),
        ];
        let now = t0() + Duration::seconds(500);
        let reconciled = reconcile(&events, None, now);
        let durations: Vec<f64> = reconciled.iter().map(|e| e.duration_secs).collect();
        assert_eq!(durations, vec![300.0, 200.0]);
        assert_eq!(reconciled[1].end, now);
    }

    #[test]
    fn windowed_slice_closes_on_the_following_event() {
        let events = vec![stored(1, 0, MachineState::Running)];
        let following = stored(2, 120, MachineState::Idle);
        let reconciled = reconcile(&events, Some(&following), t0() + Duration::seconds(999));
        assert_eq!(reconciled[0].duration_secs, 120.0);
    }

    #[test]
    fn identical_timestamps_give_zero_and_never_negative() {
        let events = vec![
            stored(1, 10, MachineState::Idle),
            stored(2, 10, MachineState::Error),
        ];
        // "now" earlier than the last event, e.g. a skewed clock.
        let reconciled = reconcile(&events, None, t0());
        assert_eq!(reconciled[0].duration_secs, 0.0);
        assert_eq!(reconciled[1].duration_secs, 0.0);
        assert!(reconciled.iter().all(|e| e.end >= e.timestamp));
    }

    #[test]
    fn empty_history_reconciles_to_nothing() {
        assert!(reconcile(&[], None, t0()).is_empty());
    }

    #[test]
    fn durations_tile_the_covered_span_and_are_idempotent() {
        let mut rng = StdRng::seed_from_u64(7);
        let states = MachineState::ALL;
        for _ in 0..50 {
            let mut offset = 0;
            let mut events = Vec::new();
            for id in 0..rng.gen_range(1..40) {
                offset += rng.gen_range(0..900);
                events.push(stored(id, offset, states[id as usize % 3]));
            }
            let now = t0() + Duration::seconds(offset + rng.gen_range(0..600));

            let first = reconcile(&events, None, now);
            let second = reconcile(&events, None, now);
            assert_eq!(first, second);

            let from = rng.gen_range(0..first.len());
            let to = rng.gen_range(from..first.len());
            let covered: Duration = first[from..=to]
                .iter()
                .map(|e| e.end - e.timestamp)
                .fold(Duration::zero(), |acc, d| acc + d);
            assert_eq!(covered, first[to].end - first[from].timestamp);
            assert!(first.iter().all(|e| e.duration_secs >= 0.0));
        }
    }
}
