use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Committed operating condition of the monitored machine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineState {
    Running,
    #[default]
    Idle,
    Error,
}

impl MachineState {
    pub const ALL: [MachineState; 3] = [
        MachineState::Running,
        MachineState::Idle,
        MachineState::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Running => "RUNNING",
            MachineState::Idle => "IDLE",
            MachineState::Error => "ERROR",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineState {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_uppercase().as_str() {
            "RUNNING" => Ok(MachineState::Running),
            "IDLE" => Ok(MachineState::Idle),
            "ERROR" => Ok(MachineState::Error),
            _ => Err(anyhow!("unknown machine state '{value}'")),
        }
    }
}

/// State carried by a timeline interval. `NoData` is synthetic and never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimelineState {
    Running,
    Idle,
    Error,
    NoData,
}

impl TimelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimelineState::Running => "RUNNING",
            TimelineState::Idle => "IDLE",
            TimelineState::Error => "ERROR",
            TimelineState::NoData => "NO_DATA",
        }
    }

    pub fn machine_state(&self) -> Option<MachineState> {
        match self {
            TimelineState::Running => Some(MachineState::Running),
            TimelineState::Idle => Some(MachineState::Idle),
            TimelineState::Error => Some(MachineState::Error),
            TimelineState::NoData => None,
        }
    }
}

impl From<MachineState> for TimelineState {
    fn from(state: MachineState) -> Self {
        match state {
            MachineState::Running => TimelineState::Running,
            MachineState::Idle => TimelineState::Idle,
            MachineState::Error => TimelineState::Error,
        }
    }
}

/// Filter applied to event listings: everything, or a single state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter {
    All,
    Only(MachineState),
}

impl FromStr for StateFilter {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case("all") {
            return Ok(StateFilter::All);
        }
        value
            .parse::<MachineState>()
            .map(StateFilter::Only)
            .map_err(|_| {
                anyhow!("invalid state filter '{value}', expected all, running, idle or error")
            })
    }
}

impl StateFilter {
    pub fn matches(&self, state: MachineState) -> bool {
        match self {
            StateFilter::All => true,
            StateFilter::Only(wanted) => *wanted == state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_states_case_insensitively() {
        assert_eq!("running".parse::<MachineState>().unwrap(), MachineState::Running);
        assert_eq!("IDLE".parse::<MachineState>().unwrap(), MachineState::Idle);
        assert!("offline".parse::<MachineState>().is_err());
    }

    #[test]
    fn state_filter_accepts_all_or_a_state() {
        assert_eq!("All".parse::<StateFilter>().unwrap(), StateFilter::All);
        let only_error: StateFilter = "error".parse().unwrap();
        assert!(only_error.matches(MachineState::Error));
        assert!(!only_error.matches(MachineState::Idle));
        assert_eq!(MachineState::default(), MachineState::Idle);
        assert!("busy".parse::<StateFilter>().is_err());
    }

    #[test]
    fn serializes_with_wire_names() {
        let json = serde_json::to_string(&TimelineState::NoData).unwrap();
        assert_eq!(json, "\"NO_DATA\"");
        let json = serde_json::to_string(&MachineState::Running).unwrap();
        assert_eq!(json, "\"RUNNING\"");
    }
}
