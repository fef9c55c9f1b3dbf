use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::Transition;
use crate::models::MachineState;

/// A committed state change as persisted. Duration is not stored; it is
/// derived from the spacing to the next event on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEvent {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub state: MachineState,
    pub tag_id: Option<i64>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStateEvent {
    pub timestamp: DateTime<Utc>,
    pub state: MachineState,
    pub tag_id: Option<i64>,
    pub description: String,
}

impl From<&Transition> for NewStateEvent {
    fn from(transition: &Transition) -> Self {
        Self {
            timestamp: transition.at,
            state: transition.to,
            tag_id: transition.tag_id,
            description: transition.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectReason {
    /// The latest stored event already carries this state.
    SameState,
    /// The event predates the latest stored event.
    OutOfOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AppendOutcome {
    Inserted(i64),
    Rejected(RejectReason),
}
