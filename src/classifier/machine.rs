use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{MachineState, PositionSample, RawKind};

use super::descriptions::{DescriptionPicker, RoundRobinDescriptions};
use super::motion::MotionClassifier;

// Pending-state chatter is per tick; keep it off unless debugging.
const ENABLE_LOGS: bool = false;

use crate::log_info;

/// Tunable thresholds for the hysteresis rules.
#[derive(Debug, Clone)]
pub struct StateMachineConfig {
    /// Minimum marker displacement per tick that counts as movement.
    pub movement_threshold: f64,
    /// No detection for longer than this forces ERROR.
    pub error_timeout: Duration,
    /// How long a non-ERROR candidate must persist before it is committed.
    pub state_change_delay: Duration,
    pub history_size: usize,
    pub confidence_count: usize,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            movement_threshold: 0.5,
            error_timeout: Duration::milliseconds(3_000),
            state_change_delay: Duration::milliseconds(500),
            history_size: 6,
            confidence_count: 4,
        }
    }
}

/// A committed state change, ready to be appended to the event store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub from: MachineState,
    pub to: MachineState,
    pub at: DateTime<Utc>,
    pub tag_id: Option<i64>,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Pending {
    target: MachineState,
    since: DateTime<Utc>,
}

/// Debounced RUNNING/IDLE/ERROR classifier. One instance per monitored marker.
pub struct StateMachine {
    config: StateMachineConfig,
    classifier: MotionClassifier,
    current: MachineState,
    pending: Option<Pending>,
    last_detection: Option<DateTime<Utc>>,
    last_tag_id: Option<i64>,
    descriptions: Box<dyn DescriptionPicker>,
}

impl StateMachine {
    pub fn new(config: StateMachineConfig) -> Self {
        Self::with_descriptions(config, Box::new(RoundRobinDescriptions::default()))
    }

    pub fn with_descriptions(
        config: StateMachineConfig,
        descriptions: Box<dyn DescriptionPicker>,
    ) -> Self {
        let classifier = MotionClassifier::new(
            config.movement_threshold,
            config.history_size,
            config.confidence_count,
        );
        Self {
            config,
            classifier,
            current: MachineState::Idle,
            pending: None,
            last_detection: None,
            last_tag_id: None,
            descriptions,
        }
    }

    pub fn current_state(&self) -> MachineState {
        self.current
    }

    pub fn pending_state(&self) -> Option<MachineState> {
        self.pending.map(|pending| pending.target)
    }

    pub fn last_detection(&self) -> Option<DateTime<Utc>> {
        self.last_detection
    }

    /// Feed one sample. Returns the transition when this tick commits one;
    /// never more than one per call.
    pub fn tick(&mut self, sample: &PositionSample, now: DateTime<Utc>) -> Option<Transition> {
        let signal = self.classifier.observe(sample);

        if signal.kind != RawKind::None {
            self.last_detection = Some(now);
            if let Some(tag_id) = sample.tag_id {
                self.last_tag_id = Some(tag_id);
            }
        }

        let timed_out = match self.last_detection {
            Some(seen) => now - seen > self.config.error_timeout,
            None => true,
        };

        let target = if timed_out {
            MachineState::Error
        } else if signal.kind == RawKind::None {
            // Brief dropout inside the timeout: hold everything as it is.
            return None;
        } else if signal.distance > self.classifier.movement_threshold() {
            MachineState::Running
        } else {
            MachineState::Idle
        };

        self.evaluate(target, now)
    }

    fn evaluate(&mut self, target: MachineState, now: DateTime<Utc>) -> Option<Transition> {
        if target == self.current {
            self.pending = None;
            return None;
        }

        if target == MachineState::Error {
            return Some(self.commit(target, now));
        }

        if target == MachineState::Running && self.classifier.consistent_movement() {
            return Some(self.commit(target, now));
        }

        match self.pending {
            Some(pending) if pending.target == target => {
                if now - pending.since >= self.config.state_change_delay {
                    Some(self.commit(target, now))
                } else {
                    None
                }
            }
            _ => {
                log_info!("pending {} -> {}", self.current, target);
                self.pending = Some(Pending { target, since: now });
                None
            }
        }
    }

    fn commit(&mut self, target: MachineState, now: DateTime<Utc>) -> Transition {
        let from = self.current;
        self.current = target;
        self.pending = None;
        if target == MachineState::Error {
            self.classifier.forget_position();
        }

        Transition {
            from,
            to: target,
            at: now,
            tag_id: self.last_tag_id,
            description: self.descriptions.pick(target),
        }
    }

    /// Take over a state already on record, e.g. after a restart.
    pub fn adopt(&mut self, state: MachineState) {
        self.current = state;
        self.pending = None;
    }

    /// Back to the initial IDLE state with no history, as after a bulk clear.
    pub fn reset(&mut self) {
        self.current = MachineState::Idle;
        self.pending = None;
        self.last_detection = None;
        self.classifier.reset();
    }
}
