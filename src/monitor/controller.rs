use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use log::{info, warn};
use tokio::sync::{watch, Mutex};

use crate::{
    calendar::{Calendar, Period},
    classifier::{DescriptionPicker, RoundRobinDescriptions, SeededDescriptions, StateMachine},
    config::{self, MonitorConfig},
    db::{Database, StateEvent},
    history::{
        build_timeline, export_csv, reconcile, Aggregator, Interval, PeriodSummary,
        ReconciledEvent,
    },
    metrics::{MetricsCollector, MetricsSnapshot},
    models::{MachineState, StateFilter, StateSnapshot},
    sensing::{Classification, LoopContext, PositionSource, SensingController},
};

use super::views::{CurrentState, LiveStatus, LiveView, NO_STATE_DESCRIPTION};

pub const DEFAULT_EVENT_LIMIT: usize = 50;
pub const DEFAULT_DATE_EVENT_LIMIT: usize = 1_000;

/// Ties the classification loop to the event store and answers history queries.
///
/// Queries only ever touch the store and the snapshot channel, never the
/// classification lock, so they cannot hold up a tick. Bulk clear is the one
/// operation that takes that lock.
#[derive(Clone)]
pub struct MonitorController {
    classification: Arc<Mutex<Classification>>,
    db: Database,
    aggregator: Aggregator,
    sensing: Arc<Mutex<SensingController>>,
    snapshots: Arc<watch::Sender<Option<StateSnapshot>>>,
    metrics: MetricsCollector,
    tick_interval: std::time::Duration,
    tick_timeout: std::time::Duration,
    heartbeat_every_ticks: u64,
}

impl MonitorController {
    pub fn new(config: &MonitorConfig, db: Database) -> Result<Self> {
        config.validate()?;

        let descriptions: Box<dyn DescriptionPicker> = match config.description_seed {
            Some(seed) => Box::new(SeededDescriptions::new(seed)),
            None => Box::new(RoundRobinDescriptions::default()),
        };
        let machine = StateMachine::with_descriptions(config.state_machine(), descriptions);
        let (snapshots, _) = watch::channel(None);

        let fps = u64::from(config.target_fps);
        let heartbeat_every_ticks = if config::debug_mode() { fps } else { fps * 60 };

        Ok(Self {
            classification: Arc::new(Mutex::new(Classification::new(machine))),
            db,
            aggregator: Aggregator::new(config.calendar()?, config.full_workday_secs),
            sensing: Arc::new(Mutex::new(SensingController::new())),
            snapshots: Arc::new(snapshots),
            metrics: MetricsCollector::new(),
            tick_interval: config.tick_interval(),
            tick_timeout: config.tick_timeout(),
            heartbeat_every_ticks,
        })
    }

    pub fn calendar(&self) -> &Calendar {
        self.aggregator.calendar()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<StateSnapshot>> {
        self.snapshots.subscribe()
    }

    /// Take over the latest stored state so a restart does not append a
    /// duplicate of what is already on record.
    pub async fn recover(&self) -> Result<Option<MachineState>> {
        let Some(latest) = self.db.latest_state_event().await? else {
            return Ok(None);
        };

        info!(
            "resuming from stored {} state committed at {}",
            latest.state, latest.timestamp
        );
        self.classification
            .lock()
            .await
            .machine_mut()
            .adopt(latest.state);
        self.snapshots.send_replace(Some(StateSnapshot {
            state: latest.state,
            tag_id: latest.tag_id,
            timestamp: latest.timestamp,
        }));
        Ok(Some(latest.state))
    }

    pub async fn start<S>(&self, source: S) -> Result<()>
    where
        S: PositionSource + 'static,
    {
        // Held across recovery so a second start cannot touch the live state.
        let mut sensing = self.sensing.lock().await;
        if sensing.is_running() {
            bail!("sensing already active");
        }
        self.recover().await?;

        let ctx = LoopContext {
            classification: Arc::clone(&self.classification),
            db: self.db.clone(),
            snapshots: Arc::clone(&self.snapshots),
            metrics: self.metrics.clone(),
            tick_interval: self.tick_interval,
            tick_timeout: self.tick_timeout,
            heartbeat_every_ticks: self.heartbeat_every_ticks,
        };
        sensing.start_sensing(source, ctx)
    }

    pub async fn stop(&self) -> Result<()> {
        self.sensing.lock().await.stop_sensing().await
    }

    pub async fn is_running(&self) -> bool {
        self.sensing.lock().await.is_running()
    }

    pub async fn current_state(&self, now: DateTime<Utc>) -> Result<CurrentState> {
        let current = match self.db.latest_state_event().await? {
            Some(event) => CurrentState {
                state: event.state,
                description: event.description,
                timestamp: event.timestamp,
                last_tag_id: event.tag_id,
            },
            None => CurrentState {
                state: MachineState::Idle,
                description: NO_STATE_DESCRIPTION.to_string(),
                timestamp: now,
                last_tag_id: None,
            },
        };
        Ok(current)
    }

    pub fn live_view(&self, now: DateTime<Utc>) -> LiveView {
        let snapshot = self.snapshots.borrow().clone();
        let status = if !self.calendar().is_working_time(now) {
            LiveStatus::Offline
        } else {
            snapshot
                .as_ref()
                .map_or(LiveStatus::Idle, |snapshot| snapshot.state.into())
        };

        LiveView {
            status,
            last_tag_id: snapshot.as_ref().and_then(|snapshot| snapshot.tag_id),
            since: snapshot.map(|snapshot| snapshot.timestamp),
        }
    }

    /// Delete every stored event and start the machine over from IDLE.
    /// Returns the number of removed events.
    pub async fn clear_all(&self) -> Result<usize> {
        let mut classification = self.classification.lock().await;
        let removed = self.db.delete_all_state_events().await?;
        classification.reset();
        self.snapshots.send_replace(None);
        drop(classification);

        warn!("cleared {removed} state events");
        Ok(removed)
    }

    pub async fn metrics(&self, period: Period, now: DateTime<Utc>) -> Result<PeriodSummary> {
        let start = self.calendar().period_start(period, now)?;
        let window = self.window(start, now).await?;
        let reconciled = reconcile(&window.events, window.following.as_ref(), now);
        let timeline = build_timeline(&reconciled, start, now);

        let in_period: Vec<ReconciledEvent> = reconciled
            .into_iter()
            .filter(|event| event.timestamp >= start)
            .collect();
        self.aggregator.summarize(period, &timeline, &in_period, now)
    }

    /// Gapless interval list for `[start, end]`.
    pub async fn timeline(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Interval>> {
        if start >= end {
            return Ok(Vec::new());
        }
        let window = self.window(start, end).await?;
        let reconciled = reconcile(&window.events, window.following.as_ref(), now);
        Ok(build_timeline(&reconciled, start, end))
    }

    /// Events of a period, newest first.
    pub async fn events(
        &self,
        period: Period,
        filter: StateFilter,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReconciledEvent>> {
        let start = self.calendar().period_start(period, now)?;
        let events = self.db.query_state_events(start, now).await?;
        let reconciled = reconcile(&events, None, now);

        Ok(reconciled
            .into_iter()
            .rev()
            .filter(|event| filter.matches(event.state))
            .take(limit)
            .collect())
    }

    /// Events of one local calendar day, oldest first.
    pub async fn events_by_date(
        &self,
        date: NaiveDate,
        filter: StateFilter,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReconciledEvent>> {
        let (day_start, day_end) = self.calendar().day_bounds(date);
        let (events, following) = self.split_at_end(day_start, day_end).await?;
        let reconciled = reconcile(&events, following.as_ref(), now);

        Ok(reconciled
            .into_iter()
            .filter(|event| filter.matches(event.state))
            .take(limit)
            .collect())
    }

    /// Whole history as CSV, oldest first.
    pub async fn export(&self, now: DateTime<Utc>) -> Result<String> {
        let events = self.db.all_state_events().await?;
        let reconciled = reconcile(&events, None, now);
        Ok(export_csv(&reconciled, self.calendar()))
    }

    pub async fn tick_metrics(&self) -> MetricsSnapshot {
        self.metrics.get_snapshot().await
    }

    /// Events touching `[start, end)`: the one in force at `start`, those
    /// starting inside, and the first one after to close the last interval.
    async fn window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Window> {
        let preceding = self.db.state_event_before(start).await?;
        let (inside, following) = self.split_at_end(start, end).await?;

        let mut events = Vec::with_capacity(inside.len() + 1);
        events.extend(preceding);
        events.extend(inside);
        Ok(Window { events, following })
    }

    /// Events with `start <= timestamp < end` plus the first event at or after `end`.
    async fn split_at_end(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(Vec<StateEvent>, Option<StateEvent>)> {
        let mut events = self.db.query_state_events(start, end).await?;
        let boundary = events.iter().position(|event| event.timestamp >= end);
        let following = match boundary {
            Some(index) => events.drain(index..).next(),
            None => self.db.state_event_after(end).await?,
        };
        Ok((events, following))
    }
}

struct Window {
    events: Vec<StateEvent>,
    following: Option<StateEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewStateEvent;
    use crate::models::TimelineState;
    use chrono::{Duration, TimeZone};
    use chrono_tz::America::Chicago;

    /// Wednesday 2024-03-13, 08:00 in Chicago.
    fn t0() -> DateTime<Utc> {
        Chicago
            .with_ymd_and_hms(2024, 3, 13, 8, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn secs(offset: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(offset)
    }

    fn controller() -> MonitorController {
        MonitorController::new(&MonitorConfig::default(), Database::in_memory().unwrap()).unwrap()
    }

    async fn record(controller: &MonitorController, offset: i64, state: MachineState) {
        controller
            .db
            .append_state_event(NewStateEvent {
                timestamp: secs(offset),
                state,
                tag_id: Some(2),
                description: format!("{state}"),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn current_state_falls_back_to_a_placeholder() {
        let controller = controller();
        let current = controller.current_state(t0()).await.unwrap();
        assert_eq!(current.state, MachineState::Idle);
        assert_eq!(current.description, NO_STATE_DESCRIPTION);
        assert_eq!(current.last_tag_id, None);

        record(&controller, 0, MachineState::Running).await;
        let current = controller.current_state(secs(10)).await.unwrap();
        assert_eq!(current.state, MachineState::Running);
        assert_eq!(current.last_tag_id, Some(2));
    }

    #[tokio::test]
    async fn recover_adopts_the_stored_state() {
        let controller = controller();
        record(&controller, 0, MachineState::Running).await;

        assert_eq!(controller.recover().await.unwrap(), Some(MachineState::Running));
        let classification = controller.classification.lock().await;
        assert_eq!(classification.machine().current_state(), MachineState::Running);
        drop(classification);

        let view = controller.live_view(secs(60));
        assert_eq!(view.status, LiveStatus::Running);
        assert_eq!(view.since, Some(t0()));
    }

    #[tokio::test]
    async fn live_view_is_offline_outside_working_hours() {
        let controller = controller();
        record(&controller, 0, MachineState::Running).await;
        controller.recover().await.unwrap();

        // 18:00 local
        assert_eq!(controller.live_view(secs(10 * 3_600)).status, LiveStatus::Offline);
        // Saturday mid-morning
        let saturday = t0() + Duration::days(3);
        assert_eq!(controller.live_view(saturday).status, LiveStatus::Offline);
    }

    #[tokio::test]
    async fn timeline_covers_the_window_with_neighbouring_events() {
        let controller = controller();
        record(&controller, -600, MachineState::Error).await;
        record(&controller, 100, MachineState::Idle).await;
        record(&controller, 1_200, MachineState::Running).await;

        let timeline = controller.timeline(secs(0), secs(1_000), secs(5_000)).await.unwrap();
        let states: Vec<_> = timeline.iter().map(|i| i.state).collect();
        assert_eq!(states, vec![TimelineState::Error, TimelineState::Idle]);
        assert_eq!(timeline[1].end, secs(1_000));
        assert_eq!(timeline[1].duration_secs, 900.0);
    }

    #[tokio::test]
    async fn timeline_past_now_ends_in_no_data() {
        let controller = controller();
        record(&controller, 100, MachineState::Idle).await;

        let timeline = controller.timeline(secs(0), secs(1_000), secs(400)).await.unwrap();
        let states: Vec<_> = timeline.iter().map(|i| i.state).collect();
        assert_eq!(
            states,
            vec![TimelineState::NoData, TimelineState::Idle, TimelineState::NoData]
        );
        assert!(controller.timeline(secs(10), secs(10), secs(400)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn events_are_newest_first_and_filtered() {
        let controller = controller();
        record(&controller, 0, MachineState::Running).await;
        record(&controller, 300, MachineState::Idle).await;
        record(&controller, 400, MachineState::Running).await;

        let now = secs(500);
        let all = controller
            .events(Period::Today, StateFilter::All, DEFAULT_EVENT_LIMIT, now)
            .await
            .unwrap();
        let durations: Vec<f64> = all.iter().map(|e| e.duration_secs).collect();
        assert_eq!(durations, vec![100.0, 100.0, 300.0]);

        let running = controller
            .events(Period::Today, StateFilter::Only(MachineState::Running), 1, now)
            .await
            .unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].timestamp, secs(400));
    }

    #[tokio::test]
    async fn events_by_date_close_with_the_next_day() {
        let controller = controller();
        // 16:00 local Wednesday, then 07:00 local Thursday.
        record(&controller, 8 * 3_600, MachineState::Idle).await;
        record(&controller, 23 * 3_600, MachineState::Running).await;

        let date = NaiveDate::from_ymd_opt(2024, 3, 13).unwrap();
        let events = controller
            .events_by_date(date, StateFilter::All, DEFAULT_DATE_EVENT_LIMIT, secs(30 * 3_600))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].duration_secs, 15.0 * 3_600.0);
    }

    #[tokio::test]
    async fn clear_all_empties_history_and_resets_the_machine() {
        let controller = controller();
        record(&controller, 0, MachineState::Running).await;
        record(&controller, 10, MachineState::Error).await;
        controller.recover().await.unwrap();

        assert_eq!(controller.clear_all().await.unwrap(), 2);
        assert!(controller.db.latest_state_event().await.unwrap().is_none());
        let classification = controller.classification.lock().await;
        assert_eq!(classification.machine().current_state(), MachineState::Idle);
        drop(classification);
        assert_eq!(controller.live_view(secs(60)).since, None);
    }

    #[tokio::test]
    async fn today_metrics_reconcile_durations() {
        let controller = controller();
        record(&controller, 0, MachineState::Running).await;
        record(&controller, 300, MachineState::Idle).await;

        let summary = controller.metrics(Period::Today, secs(500)).await.unwrap();
        assert_eq!(summary.state_totals.running, 300.0);
        assert_eq!(summary.state_totals.idle, 200.0);
        assert_eq!(summary.percentages.running, 60.0);
        assert_eq!(summary.daily.len(), 1);
        assert!(!summary.daily[0].unmonitored);
    }

    #[tokio::test]
    async fn export_lists_everything_oldest_first() {
        let controller = controller();
        record(&controller, 0, MachineState::Running).await;
        record(&controller, 300, MachineState::Idle).await;

        let csv = controller.export(secs(500)).await.unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("RUNNING,300.0,2024-03-13 08:00:00"));
        assert!(lines[2].starts_with("IDLE,200.0,"));
    }

    #[tokio::test]
    async fn start_and_stop_drive_the_sensing_loop() {
        use crate::sensing::{Phase, SimulatedSource};

        let config = MonitorConfig {
            target_fps: 200,
            ..MonitorConfig::default()
        };
        let controller = MonitorController::new(&config, Database::in_memory().unwrap()).unwrap();
        let source = SimulatedSource::scripted(3, vec![(Phase::Absent, 10_000)]);

        let mut updates = controller.subscribe();
        controller.start(source).await.unwrap();
        assert!(controller.is_running().await);
        updates.changed().await.unwrap();
        assert_eq!(
            updates.borrow().as_ref().map(|snapshot| snapshot.state),
            Some(MachineState::Error)
        );

        controller.stop().await.unwrap();
        assert!(!controller.is_running().await);
        let stored = controller.db.latest_state_event().await.unwrap().unwrap();
        assert_eq!(stored.state, MachineState::Error);
        assert!(controller.tick_metrics().await.tick_count > 0);
    }

    #[tokio::test]
    async fn second_start_is_refused_before_touching_live_state() {
        use crate::sensing::{Phase, SimulatedSource};

        let config = MonitorConfig {
            target_fps: 200,
            ..MonitorConfig::default()
        };
        let controller = MonitorController::new(&config, Database::in_memory().unwrap()).unwrap();
        record(&controller, 0, MachineState::Running).await;

        let mut updates = controller.subscribe();
        let source = SimulatedSource::scripted(3, vec![(Phase::Absent, 10_000)]);
        controller.start(source).await.unwrap();

        // Adopted RUNNING first, then the absent marker commits ERROR.
        loop {
            updates.changed().await.unwrap();
            let state = updates.borrow_and_update().as_ref().map(|snapshot| snapshot.state);
            if state == Some(MachineState::Error) {
                break;
            }
        }
        while controller.db.latest_state_event().await.unwrap().map(|e| e.state)
            != Some(MachineState::Error)
        {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let again = SimulatedSource::scripted(3, vec![(Phase::Stationary, 10_000)]);
        let err = controller.start(again).await.unwrap_err();
        assert!(err.to_string().contains("already active"));
        assert!(!updates.has_changed().unwrap());
        assert!(controller.is_running().await);

        controller.stop().await.unwrap();
    }
}
