use std::fmt::Write as _;

use crate::calendar::Calendar;

use super::reconcile::ReconciledEvent;

const HEADER: [&str; 5] = [
    "State",
    "Duration (seconds)",
    "Start Time",
    "End Time",
    "Description",
];

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render events (oldest first) as CSV with local wall-clock times.
pub fn export_csv(events: &[ReconciledEvent], calendar: &Calendar) -> String {
    let mut out = String::new();
    push_row(&mut out, HEADER.iter().map(|field| field.to_string()));

    for event in events {
        let start = calendar.local(event.timestamp).format(TIME_FORMAT).to_string();
        let end = calendar.local(event.end).format(TIME_FORMAT).to_string();
        push_row(
            &mut out,
            [
                event.state.to_string(),
                format!("{:.1}", event.duration_secs),
                start,
                end,
                event.description.clone(),
            ]
            .into_iter(),
        );
    }

    out
}

fn push_row(out: &mut String, fields: impl Iterator<Item = String>) {
    for (index, field) in fields.enumerate() {
        if index > 0 {
            out.push(',');
        }
        out.push_str(&escape(&field));
    }
    out.push_str("\r\n");
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        let mut quoted = String::with_capacity(field.len() + 2);
        let _ = write!(quoted, "\"{}\"", field.replace('"', "\"\""));
        quoted
    } else {
        field.to_string()
    }
}
