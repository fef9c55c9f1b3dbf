use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    db::Database,
    metrics::{MetricsCollector, TickMetrics},
    models::StateSnapshot,
};

use super::classification::Classification;
use super::source::PositionSource;

// Per-tick chatter at 30 Hz; flip on when debugging the loop itself.
const ENABLE_LOGS: bool = false;

use crate::{log_error, log_info, log_warn};

/// Everything the loop shares with the rest of the monitor.
#[derive(Clone)]
pub struct LoopContext {
    pub classification: Arc<Mutex<Classification>>,
    pub db: Database,
    pub snapshots: Arc<watch::Sender<Option<StateSnapshot>>>,
    pub metrics: MetricsCollector,
    pub tick_interval: Duration,
    pub tick_timeout: Duration,
    /// Log a metrics heartbeat every this many ticks.
    pub heartbeat_every_ticks: u64,
}

pub async fn sensing_loop<S: PositionSource>(
    mut source: S,
    ctx: LoopContext,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(ctx.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                ticks += 1;
                let tick = perform_tick(&mut source, &ctx);
                match tokio::time::timeout(ctx.tick_timeout, tick).await {
                    Ok(Ok(metrics)) => ctx.metrics.record_tick(metrics).await,
                    Ok(Err(err)) => {
                        ctx.metrics.record_failure().await;
                        log::error!("sensing tick failed: {err:?}");
                    }
                    Err(_) => {
                        ctx.metrics.record_timeout().await;
                        log::warn!("sensing tick timeout (> {}ms)", ctx.tick_timeout.as_millis());
                    }
                }

                if ctx.heartbeat_every_ticks > 0 && ticks % ctx.heartbeat_every_ticks == 0 {
                    heartbeat(&ctx).await;
                }
            }
            _ = cancel_token.cancelled() => {
                log::info!("sensing loop shutting down after {ticks} ticks");
                break;
            }
        }
    }

    // Last chance for commits still waiting on the store.
    let mut classification = ctx.classification.lock().await;
    if classification.pending_writes() > 0 {
        if let Err(err) = classification.flush(&ctx.db).await {
            log::error!(
                "{} state commits could not be persisted before shutdown: {err:?}",
                classification.pending_writes()
            );
        }
    }
}

async fn perform_tick<S: PositionSource>(source: &mut S, ctx: &LoopContext) -> Result<TickMetrics> {
    let tick_start = Instant::now();

    let sample = source.next_sample().context("position source failed")?;
    let sample_ms = tick_start.elapsed().as_millis() as u64;
    let now = Utc::now();

    let mut classification = ctx.classification.lock().await;

    let classify_start = Instant::now();
    let transition = classification.step(&sample, now);
    let classify_ms = classify_start.elapsed().as_millis() as u64;

    if let Some(transition) = &transition {
        ctx.snapshots.send_replace(Some(StateSnapshot {
            state: transition.to,
            tag_id: transition.tag_id,
            timestamp: transition.at,
        }));
    }

    let mut db_write_ms = 0;
    if classification.pending_writes() > 0 {
        let write_start = Instant::now();
        let flushed = classification.flush(&ctx.db).await;
        db_write_ms = write_start.elapsed().as_millis() as u64;
        match flushed {
            Ok(written) => log_info!("persisted {written} state commits in {db_write_ms}ms"),
            Err(err) => {
                log_error!(
                    "store unavailable, {} commits queued: {err:?}",
                    classification.pending_writes()
                );
                return Err(err);
            }
        }
    }

    let outbox_len = classification.pending_writes();
    drop(classification);

    let total_ms = tick_start.elapsed().as_millis() as u64;
    if total_ms > ctx.tick_interval.as_millis() as u64 {
        log_warn!("tick overran its period: {total_ms}ms");
    }

    Ok(TickMetrics {
        timestamp: now,
        sample_ms,
        classify_ms,
        db_write_ms,
        total_ms,
        detected: sample.marker().is_some(),
        committed: transition.map(|transition| transition.to),
        outbox_len,
    })
}

async fn heartbeat(ctx: &LoopContext) {
    let snapshot = ctx.metrics.get_snapshot().await;
    log::info!(
        "sensing heartbeat: {} ticks, {} detections, {} commits, {} failures, {} timeouts, mean tick {:.2}ms, cpu {:.1}%, rss {:.1}MB",
        snapshot.tick_count,
        snapshot.detection_count,
        snapshot.commit_count,
        snapshot.failure_count,
        snapshot.timeout_count,
        snapshot.mean_tick_ms(),
        snapshot.system.cpu_percent,
        snapshot.system.memory_mb,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{StateMachine, StateMachineConfig};
    use crate::models::MachineState;
    use crate::sensing::simulator::{Phase, SimulatedSource};

    fn context(db: Database) -> (LoopContext, watch::Receiver<Option<StateSnapshot>>) {
        let (snapshots, receiver) = watch::channel(None);
        let ctx = LoopContext {
            classification: Arc::new(Mutex::new(Classification::new(StateMachine::new(
                StateMachineConfig::default(),
            )))),
            db,
            snapshots: Arc::new(snapshots),
            metrics: MetricsCollector::new(),
            tick_interval: Duration::from_millis(5),
            tick_timeout: Duration::from_millis(500),
            heartbeat_every_ticks: 0,
        };
        (ctx, receiver)
    }

    #[tokio::test]
    async fn absent_marker_commits_error_and_publishes_it() {
        let db = Database::in_memory().unwrap();
        let (ctx, receiver) = context(db.clone());
        let mut source = SimulatedSource::scripted(7, vec![(Phase::Absent, 1)]);
        let metrics = perform_tick(&mut source, &ctx).await.unwrap();
        assert_eq!(metrics.committed, Some(MachineState::Error));
        assert!(!metrics.detected);
        assert_eq!(metrics.outbox_len, 0);

        let published = receiver.borrow().clone().unwrap();
        assert_eq!(published.state, MachineState::Error);
        let stored = db.latest_state_event().await.unwrap().unwrap();
        assert_eq!(stored.state, MachineState::Error);
    }

    #[tokio::test]
    async fn loop_stops_on_cancel_and_counts_ticks() {
        let db = Database::in_memory().unwrap();
        let (ctx, _receiver) = context(db.clone());
        let metrics = ctx.metrics.clone();
        let cancel = CancellationToken::new();
        let source = SimulatedSource::scripted(7, vec![(Phase::Stationary, 1_000)]);

        let handle = tokio::spawn(sensing_loop(source, ctx, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();
        handle.await.unwrap();

        let snapshot = metrics.get_snapshot().await;
        assert!(snapshot.tick_count > 0);
        assert_eq!(snapshot.tick_count, snapshot.detection_count);
        // Marker is visible from the first tick: no ERROR, and IDLE is the initial state.
        assert!(db.all_state_events().await.unwrap().is_empty());
    }
}
