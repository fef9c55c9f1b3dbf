use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::models::MachineState;

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_state(value: &str) -> Result<MachineState> {
    value
        .parse::<MachineState>()
        .with_context(|| format!("unknown stored state {value}"))
}

/// Sort key stored next to the RFC 3339 text; text ordering breaks across offsets.
pub fn to_micros(value: DateTime<Utc>) -> i64 {
    value.timestamp_micros()
}
