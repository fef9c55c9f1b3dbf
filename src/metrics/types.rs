use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::MachineState;

/// Timing of one completed classification tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickMetrics {
    pub timestamp: DateTime<Utc>,
    pub sample_ms: u64,
    pub classify_ms: u64,
    /// Time spent flushing the outbox; zero on ticks without pending writes.
    pub db_write_ms: u64,
    pub total_ms: u64,
    pub detected: bool,
    pub committed: Option<MachineState>,
    pub outbox_len: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub system: SystemMetrics,
    pub recent_ticks: Vec<TickMetrics>,
    pub tick_count: u64,
    pub detection_count: u64,
    pub commit_count: u64,
    pub failure_count: u64,
    pub timeout_count: u64,
}

impl MetricsSnapshot {
    /// Mean total tick time over the recent window.
    pub fn mean_tick_ms(&self) -> f64 {
        if self.recent_ticks.is_empty() {
            return 0.0;
        }
        let total: u64 = self.recent_ticks.iter().map(|tick| tick.total_ms).sum();
        total as f64 / self.recent_ticks.len() as f64
    }
}
