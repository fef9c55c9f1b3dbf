mod types;

pub use types::{MetricsSnapshot, SystemMetrics, TickMetrics};

use std::collections::VecDeque;
use std::sync::Arc;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::Mutex;

const MAX_RECENT_TICKS: usize = 60;

/// Counters for the sensing loop, shared with whoever wants to report them.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

struct MetricsState {
    recent_ticks: VecDeque<TickMetrics>,
    tick_count: u64,
    detection_count: u64,
    commit_count: u64,
    failure_count: u64,
    timeout_count: u64,
    system: System,
    pid: Pid,
}

impl MetricsState {
    fn system_metrics(&mut self) -> SystemMetrics {
        let pid = self.pid;
        // CPU usage is a delta between refreshes.
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        match self.system.process(pid) {
            Some(process) => SystemMetrics {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            },
            None => SystemMetrics::default(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent_ticks: VecDeque::with_capacity(MAX_RECENT_TICKS),
                tick_count: 0,
                detection_count: 0,
                commit_count: 0,
                failure_count: 0,
                timeout_count: 0,
                system,
                pid,
            })),
        }
    }

    pub async fn record_tick(&self, metrics: TickMetrics) {
        let mut state = self.inner.lock().await;

        state.tick_count += 1;
        if metrics.detected {
            state.detection_count += 1;
        }
        if metrics.committed.is_some() {
            state.commit_count += 1;
        }

        state.recent_ticks.push_back(metrics);
        while state.recent_ticks.len() > MAX_RECENT_TICKS {
            state.recent_ticks.pop_front();
        }
    }

    pub async fn record_failure(&self) {
        self.inner.lock().await.failure_count += 1;
    }

    pub async fn record_timeout(&self) {
        self.inner.lock().await.timeout_count += 1;
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let mut state = self.inner.lock().await;
        let system = state.system_metrics();

        MetricsSnapshot {
            system,
            recent_ticks: state.recent_ticks.iter().cloned().collect(),
            tick_count: state.tick_count,
            detection_count: state.detection_count,
            commit_count: state.commit_count,
            failure_count: state.failure_count,
            timeout_count: state.timeout_count,
        }
    }

    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        let pid = state.pid;
        state.recent_ticks.clear();
        state.tick_count = 0;
        state.detection_count = 0;
        state.commit_count = 0;
        state.failure_count = 0;
        state.timeout_count = 0;
        state.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
    }
}
