use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::MachineState;

pub const NO_STATE_DESCRIPTION: &str = "No state data available";

/// Latest persisted state, or an IDLE placeholder for an empty history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentState {
    pub state: MachineState,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub last_tag_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiveStatus {
    Running,
    Idle,
    Error,
    /// Outside working hours; the machine is not expected to run.
    Offline,
}

impl From<MachineState> for LiveStatus {
    fn from(state: MachineState) -> Self {
        match state {
            MachineState::Running => LiveStatus::Running,
            MachineState::Idle => LiveStatus::Idle,
            MachineState::Error => LiveStatus::Error,
        }
    }
}

/// What a dashboard shows right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveView {
    pub status: LiveStatus,
    pub last_tag_id: Option<i64>,
    /// When the shown state was committed; `None` before the first commit.
    pub since: Option<DateTime<Utc>>,
}
