use std::collections::VecDeque;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::classifier::{StateMachine, Transition};
use crate::db::{AppendOutcome, Database, NewStateEvent};
use crate::models::PositionSample;

/// The state machine together with the commits it has not managed to persist yet.
///
/// Both live behind one lock so a bulk clear can drop the history, reset the
/// machine and forget queued writes as a single step.
pub struct Classification {
    machine: StateMachine,
    outbox: VecDeque<NewStateEvent>,
}

impl Classification {
    pub fn new(machine: StateMachine) -> Self {
        Self {
            machine,
            outbox: VecDeque::new(),
        }
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut StateMachine {
        &mut self.machine
    }

    pub fn pending_writes(&self) -> usize {
        self.outbox.len()
    }

    /// Run one sample through the machine and queue any resulting commit.
    pub fn step(&mut self, sample: &PositionSample, now: DateTime<Utc>) -> Option<Transition> {
        let transition = self.machine.tick(sample, now)?;
        info!(
            "machine state {} -> {} (tag {:?}): {}",
            transition.from, transition.to, transition.tag_id, transition.description
        );
        self.outbox.push_back(NewStateEvent::from(&transition));
        Some(transition)
    }

    /// Write queued commits oldest first. Stops at the first failure and keeps
    /// that entry and everything after it for the next attempt.
    ///
    /// Returns how many rows were inserted.
    pub async fn flush(&mut self, db: &Database) -> Result<usize> {
        let mut inserted = 0;
        while let Some(event) = self.outbox.front() {
            let outcome = db
                .append_state_event(event.clone())
                .await
                .with_context(|| format!("failed to persist {} commit", event.state))?;

            match outcome {
                AppendOutcome::Inserted(_) => inserted += 1,
                AppendOutcome::Rejected(reason) => {
                    warn!(
                        "dropping {} commit at {}: rejected as {:?}",
                        event.state, event.timestamp, reason
                    );
                }
            }
            self.outbox.pop_front();
        }
        Ok(inserted)
    }

    /// Forget all history: machine back to IDLE, queued writes dropped.
    pub fn reset(&mut self) {
        self.machine.reset();
        self.outbox.clear();
    }
}
