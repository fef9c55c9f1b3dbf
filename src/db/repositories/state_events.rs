use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    helpers::{parse_datetime, parse_state, to_micros},
    models::{AppendOutcome, NewStateEvent, RejectReason, StateEvent},
    Database,
};

const SELECT_COLUMNS: &str = "SELECT id, timestamp, state, tag_id, description FROM state_events";

fn row_to_event(row: &Row) -> Result<StateEvent> {
    let timestamp: String = row.get("timestamp")?;
    let state: String = row.get("state")?;

    Ok(StateEvent {
        id: row.get("id")?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        state: parse_state(&state)?,
        tag_id: row.get("tag_id")?,
        description: row.get("description")?,
    })
}

fn collect_events(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<StateEvent>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut events = Vec::new();
    while let Some(row) = rows.next()? {
        events.push(row_to_event(row)?);
    }
    Ok(events)
}

fn single_event(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Option<StateEvent>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_event(row)?)),
        None => Ok(None),
    }
}

impl Database {
    /// Append one committed state. Rejects a row that repeats the latest
    /// stored state or predates it, so a retried write can never double up.
    pub async fn append_state_event(&self, event: NewStateEvent) -> Result<AppendOutcome> {
        self.write(move |conn| {
            let tx = conn.transaction()?;

            let latest: Option<(i64, String)> = tx
                .query_row(
                    "SELECT timestamp_us, state FROM state_events
                     ORDER BY timestamp_us DESC, id DESC
                     LIMIT 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            if let Some((latest_us, latest_state)) = latest {
                if parse_state(&latest_state)? == event.state {
                    return Ok(AppendOutcome::Rejected(RejectReason::SameState));
                }
                if to_micros(event.timestamp) < latest_us {
                    return Ok(AppendOutcome::Rejected(RejectReason::OutOfOrder));
                }
            }

            tx.execute(
                "INSERT INTO state_events (timestamp, timestamp_us, state, tag_id, description)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    event.timestamp.to_rfc3339(),
                    to_micros(event.timestamp),
                    event.state.as_str(),
                    event.tag_id,
                    event.description,
                ],
            )
            .with_context(|| "failed to insert state event")?;
            let id = tx.last_insert_rowid();
            tx.commit()?;

            Ok(AppendOutcome::Inserted(id))
        })
        .await
    }

    /// Events with `start <= timestamp <= end`, oldest first.
    pub async fn query_state_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StateEvent>> {
        self.read(move |conn| {
            collect_events(
                conn,
                &format!(
                    "{SELECT_COLUMNS}
                     WHERE timestamp_us >= ?1 AND timestamp_us <= ?2
                     ORDER BY timestamp_us ASC, id ASC"
                ),
                params![to_micros(start), to_micros(end)],
            )
        })
        .await
    }

    pub async fn all_state_events(&self) -> Result<Vec<StateEvent>> {
        self.read(|conn| {
            collect_events(
                conn,
                &format!("{SELECT_COLUMNS} ORDER BY timestamp_us ASC, id ASC"),
                [],
            )
        })
        .await
    }

    pub async fn latest_state_event(&self) -> Result<Option<StateEvent>> {
        self.read(|conn| {
            single_event(
                conn,
                &format!("{SELECT_COLUMNS} ORDER BY timestamp_us DESC, id DESC LIMIT 1"),
                [],
            )
        })
        .await
    }

    /// Latest event strictly before `instant`: the state in force when a window opens.
    pub async fn state_event_before(&self, instant: DateTime<Utc>) -> Result<Option<StateEvent>> {
        self.read(move |conn| {
            single_event(
                conn,
                &format!(
                    "{SELECT_COLUMNS}
                     WHERE timestamp_us < ?1
                     ORDER BY timestamp_us DESC, id DESC
                     LIMIT 1"
                ),
                params![to_micros(instant)],
            )
        })
        .await
    }

    /// First event strictly after `instant`: closes the last event of a window.
    pub async fn state_event_after(&self, instant: DateTime<Utc>) -> Result<Option<StateEvent>> {
        self.read(move |conn| {
            single_event(
                conn,
                &format!(
                    "{SELECT_COLUMNS}
                     WHERE timestamp_us > ?1
                     ORDER BY timestamp_us ASC, id ASC
                     LIMIT 1"
                ),
                params![to_micros(instant)],
            )
        })
        .await
    }

    /// Bulk clear. Returns the number of removed events.
    pub async fn delete_all_state_events(&self) -> Result<usize> {
        self.write(|conn| {
            let removed = conn
                .execute("DELETE FROM state_events", [])
                .context("failed to clear state events")?;
            Ok(removed)
        })
        .await
    }
}
