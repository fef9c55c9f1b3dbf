use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::calendar::{Calendar, Period};
use crate::models::MachineState;

use super::{reconcile::ReconciledEvent, round1, timeline::Interval};

/// Seconds spent in each committed state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StateSeconds {
    #[serde(rename = "RUNNING")]
    pub running: f64,
    #[serde(rename = "IDLE")]
    pub idle: f64,
    #[serde(rename = "ERROR")]
    pub error: f64,
}

impl StateSeconds {
    pub fn add(&mut self, state: MachineState, secs: f64) {
        match state {
            MachineState::Running => self.running += secs,
            MachineState::Idle => self.idle += secs,
            MachineState::Error => self.error += secs,
        }
    }

    pub fn total(&self) -> f64 {
        self.running + self.idle + self.error
    }

    /// Share of the total per state, one decimal; all zero when nothing was recorded.
    pub fn percentages(&self) -> StatePercentages {
        let total = self.total();
        let share = |secs: f64| {
            if total > 0.0 {
                round1(secs / total * 100.0)
            } else {
                0.0
            }
        };
        StatePercentages {
            running: share(self.running),
            idle: share(self.idle),
            error: share(self.error),
        }
    }

    /// Sum of the parts of `intervals` that fall inside `[start, end)`.
    fn from_intervals(intervals: &[Interval], start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let mut seconds = StateSeconds::default();
        for interval in intervals {
            let Some(state) = interval.state.machine_state() else {
                continue;
            };
            if let Some(clipped) = interval.clip(start, end) {
                seconds.add(state, clipped.duration_secs);
            }
        }
        seconds
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatePercentages {
    #[serde(rename = "RUNNING")]
    pub running: f64,
    #[serde(rename = "IDLE")]
    pub idle: f64,
    #[serde(rename = "ERROR")]
    pub error: f64,
}

/// Number of transitions into each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    #[serde(rename = "RUNNING")]
    pub running: usize,
    #[serde(rename = "IDLE")]
    pub idle: usize,
    #[serde(rename = "ERROR")]
    pub error: usize,
}

impl StateCounts {
    fn tally<'a>(events: impl Iterator<Item = &'a ReconciledEvent>) -> Self {
        let mut counts = StateCounts::default();
        for event in events {
            match event.state {
                MachineState::Running => counts.running += 1,
                MachineState::Idle => counts.idle += 1,
                MachineState::Error => counts.error += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.running + self.idle + self.error
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyBucket {
    /// Local hour of day, 0-23.
    pub hour: u32,
    pub seconds: StateSeconds,
    pub uptime_percentage: f64,
    pub transitions: StateCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBucket {
    pub date: NaiveDate,
    pub seconds: StateSeconds,
    /// RUNNING seconds against a full workday.
    pub efficiency: f64,
    pub transitions: StateCounts,
    /// No event started on this day; the whole workday was booked as ERROR.
    pub unmonitored: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub best_day: Option<NaiveDate>,
    pub best_day_efficiency: f64,
    pub peak_hour: Option<u32>,
    pub avg_daily_runtime: f64,
    pub avg_daily_idle: f64,
    pub avg_daily_error: f64,
    /// RUNNING share of the recorded time.
    pub efficiency: f64,
    /// RUNNING time against a full workday for every elapsed workday, so
    /// unmonitored days count against it.
    pub capacity_efficiency: f64,
    pub work_days_elapsed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    pub period: Period,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub state_totals: StateSeconds,
    pub percentages: StatePercentages,
    pub hourly: Option<Vec<HourlyBucket>>,
    pub daily: Vec<DailyBucket>,
    pub summary: SummaryStats,
}

/// Buckets a timeline into working-hours aware period summaries.
#[derive(Debug, Clone)]
pub struct Aggregator {
    calendar: Calendar,
    full_workday_secs: f64,
}

impl Aggregator {
    pub fn new(calendar: Calendar, full_workday_secs: f64) -> Self {
        Self {
            calendar,
            full_workday_secs,
        }
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    /// Summarise `[period start, now]`.
    ///
    /// `intervals` is the timeline of that window and `events` the reconciled
    /// events whose timestamps fall inside it; they are only used to decide
    /// which days and hours saw any transition.
    pub fn summarize(
        &self,
        period: Period,
        intervals: &[Interval],
        events: &[ReconciledEvent],
        now: DateTime<Utc>,
    ) -> Result<PeriodSummary> {
        let start = self.calendar.period_start(period, now)?;
        let state_totals = StateSeconds::from_intervals(intervals, start, now);
        let percentages = state_totals.percentages();

        let hourly = match period {
            Period::Today => Some(self.hourly_buckets(intervals, events, now)),
            _ => None,
        };
        let daily = self.daily_buckets(intervals, events, start, now);

        let summary = SummaryStats {
            best_day: best_day(&daily).map(|bucket| bucket.date),
            best_day_efficiency: best_day(&daily).map_or(0.0, |bucket| bucket.efficiency),
            peak_hour: hourly.as_deref().and_then(peak_hour),
            avg_daily_runtime: average(&daily, |s| s.running),
            avg_daily_idle: average(&daily, |s| s.idle),
            avg_daily_error: average(&daily, |s| s.error),
            efficiency: percentages.running,
            capacity_efficiency: self.capacity_efficiency(&daily),
            work_days_elapsed: daily.len(),
        };

        Ok(PeriodSummary {
            period,
            start,
            end: now,
            state_totals,
            percentages,
            hourly,
            daily,
            summary,
        })
    }

    /// Working hours of today that have already begun.
    fn hourly_buckets(
        &self,
        intervals: &[Interval],
        events: &[ReconciledEvent],
        now: DateTime<Utc>,
    ) -> Vec<HourlyBucket> {
        let today = self.calendar.local_date(now);
        if !self.calendar.is_workday(today) {
            return Vec::new();
        }

        self.calendar
            .working_hours()
            .hours()
            .filter_map(|hour| {
                let hour_start = self.calendar.at_hour(today, hour);
                if hour_start >= now {
                    return None;
                }
                let hour_end = self.calendar.at_hour(today, hour + 1).min(now);

                let seconds = StateSeconds::from_intervals(intervals, hour_start, hour_end);
                let total = seconds.total();
                let uptime_percentage = if total > 0.0 {
                    round1(seconds.running / total * 100.0)
                } else {
                    0.0
                };
                let transitions = StateCounts::tally(
                    events
                        .iter()
                        .filter(|e| e.timestamp >= hour_start && e.timestamp < hour_end),
                );

                Some(HourlyBucket {
                    hour,
                    seconds,
                    uptime_percentage,
                    transitions,
                })
            })
            .collect()
    }

    fn daily_buckets(
        &self,
        intervals: &[Interval],
        events: &[ReconciledEvent],
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Vec<DailyBucket> {
        self.calendar
            .dates_between(start, now)
            .into_iter()
            .filter(|date| self.calendar.is_workday(*date))
            .map(|date| {
                let (day_start, day_end) = self.calendar.day_bounds(date);
                let transitions = StateCounts::tally(
                    events
                        .iter()
                        .filter(|e| e.timestamp >= day_start && e.timestamp < day_end),
                );

                let unmonitored = transitions.total() == 0;
                let seconds = if unmonitored {
                    StateSeconds {
                        error: self.full_workday_secs,
                        ..StateSeconds::default()
                    }
                } else {
                    StateSeconds::from_intervals(intervals, day_start, day_end.min(now))
                };

                DailyBucket {
                    date,
                    seconds,
                    efficiency: self.efficiency(seconds.running),
                    transitions,
                    unmonitored,
                }
            })
            .collect()
    }

    fn capacity_efficiency(&self, daily: &[DailyBucket]) -> f64 {
        if daily.is_empty() {
            return 0.0;
        }
        let running: f64 = daily.iter().map(|bucket| bucket.seconds.running).sum();
        self.efficiency(running / daily.len() as f64)
    }

    fn efficiency(&self, running_secs: f64) -> f64 {
        if self.full_workday_secs > 0.0 {
            round1(running_secs / self.full_workday_secs * 100.0)
        } else {
            0.0
        }
    }
}

/// Most RUNNING time; the earliest day wins a tie, days without any RUNNING never win.
fn best_day(daily: &[DailyBucket]) -> Option<&DailyBucket> {
    daily.iter().fold(None, |best: Option<&DailyBucket>, bucket| {
        if bucket.seconds.running <= 0.0 {
            return best;
        }
        match best {
            Some(current) if current.seconds.running >= bucket.seconds.running => Some(current),
            _ => Some(bucket),
        }
    })
}

fn peak_hour(hourly: &[HourlyBucket]) -> Option<u32> {
    hourly
        .iter()
        .filter(|bucket| bucket.seconds.running > 0.0)
        .fold(None, |best: Option<&HourlyBucket>, bucket| match best {
            Some(current) if current.seconds.running >= bucket.seconds.running => Some(current),
            _ => Some(bucket),
        })
        .map(|bucket| bucket.hour)
}

fn average(daily: &[DailyBucket], pick: impl Fn(&StateSeconds) -> f64) -> f64 {
    if daily.is_empty() {
        return 0.0;
    }
    daily.iter().map(|bucket| pick(&bucket.seconds)).sum::<f64>() / daily.len() as f64
}
