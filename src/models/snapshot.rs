use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::MachineState;

/// Latest committed state, as pushed to live consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub state: MachineState,
    pub tag_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
}
