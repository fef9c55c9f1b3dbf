use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One tick's worth of marker detection output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    pub detected: bool,
    pub position: Option<(f64, f64)>,
    pub tag_id: Option<i64>,
    pub captured_at: DateTime<Utc>,
}

impl PositionSample {
    pub fn detected(x: f64, y: f64, tag_id: Option<i64>, captured_at: DateTime<Utc>) -> Self {
        Self {
            detected: true,
            position: Some((x, y)),
            tag_id,
            captured_at,
        }
    }

    pub fn missing(captured_at: DateTime<Utc>) -> Self {
        Self {
            detected: false,
            position: None,
            tag_id: None,
            captured_at,
        }
    }

    /// Position of a detected marker; a detection without coordinates counts as missing.
    pub fn marker(&self) -> Option<(f64, f64)> {
        if self.detected {
            self.position
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawKind {
    Running,
    Idle,
    None,
}

/// Instantaneous classifier output before any debouncing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSignal {
    pub kind: RawKind,
    pub distance: f64,
}

impl RawSignal {
    pub fn none() -> Self {
        Self {
            kind: RawKind::None,
            distance: 0.0,
        }
    }
}
