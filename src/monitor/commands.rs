//! String-in, string-error query surface for whatever transport sits on top.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use crate::{
    calendar::{parse_date, Period},
    history::{Interval, PeriodSummary, ReconciledEvent},
    metrics::MetricsSnapshot,
    models::StateFilter,
};

use super::{
    CurrentState, LiveView, MonitorController, DEFAULT_DATE_EVENT_LIMIT, DEFAULT_EVENT_LIMIT,
};

fn parse_filter(state: Option<&str>) -> Result<StateFilter> {
    state.map_or(Ok(StateFilter::All), |value| value.parse())
}

fn parse_instant(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid {field} '{value}', expected RFC 3339: {err}"))
}

pub async fn get_metrics(
    controller: &MonitorController,
    period: &str,
) -> Result<PeriodSummary, String> {
    let run = async {
        let period: Period = period.parse()?;
        controller.metrics(period, Utc::now()).await
    };
    run.await.map_err(|e| e.to_string())
}

pub async fn get_events(
    controller: &MonitorController,
    period: &str,
    state: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<ReconciledEvent>, String> {
    let run = async {
        let period: Period = period.parse()?;
        let filter = parse_filter(state)?;
        controller
            .events(period, filter, limit.unwrap_or(DEFAULT_EVENT_LIMIT), Utc::now())
            .await
    };
    run.await.map_err(|e| e.to_string())
}

pub async fn get_events_by_date(
    controller: &MonitorController,
    date: &str,
    state: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<ReconciledEvent>, String> {
    let run = async {
        let date = parse_date(date)?;
        let filter = parse_filter(state)?;
        controller
            .events_by_date(date, filter, limit.unwrap_or(DEFAULT_DATE_EVENT_LIMIT), Utc::now())
            .await
    };
    run.await.map_err(|e| e.to_string())
}

pub async fn get_timeline(
    controller: &MonitorController,
    start: &str,
    end: &str,
) -> Result<Vec<Interval>, String> {
    let run = async {
        let start = parse_instant(start, "start")?;
        let end = parse_instant(end, "end")?;
        controller.timeline(start, end, Utc::now()).await
    };
    run.await.map_err(|e| e.to_string())
}

pub async fn get_current_state(controller: &MonitorController) -> Result<CurrentState, String> {
    controller
        .current_state(Utc::now())
        .await
        .map_err(|e| e.to_string())
}

pub fn get_live_state(controller: &MonitorController) -> LiveView {
    controller.live_view(Utc::now())
}

pub async fn export_states(controller: &MonitorController) -> Result<String, String> {
    controller.export(Utc::now()).await.map_err(|e| e.to_string())
}

pub async fn clear_data(controller: &MonitorController) -> Result<usize, String> {
    controller.clear_all().await.map_err(|e| e.to_string())
}

pub async fn get_tick_metrics(controller: &MonitorController) -> MetricsSnapshot {
    controller.tick_metrics().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::db::Database;

    fn controller() -> MonitorController {
        MonitorController::new(&MonitorConfig::default(), Database::in_memory().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn bad_period_is_a_validation_error() {
        let err = get_metrics(&controller(), "decade").await.unwrap_err();
        assert!(err.contains("invalid period 'decade'"));
    }

    #[tokio::test]
    async fn bad_date_and_filter_are_reported() {
        let controller = controller();
        let err = get_events_by_date(&controller, "13/03/2024", None, None)
            .await
            .unwrap_err();
        assert!(err.contains("YYYY-MM-DD"));

        let err = get_events(&controller, "week", Some("sleeping"), None)
            .await
            .unwrap_err();
        assert!(err.contains("sleeping"));
    }

    #[tokio::test]
    async fn empty_store_answers_every_query() {
        let controller = controller();
        assert!(get_events(&controller, "year", Some("all"), None).await.unwrap().is_empty());
        assert!(get_events_by_date(&controller, "2024-03-13", Some("ERROR"), Some(5))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            get_current_state(&controller).await.unwrap().description,
            crate::monitor::NO_STATE_DESCRIPTION
        );
        assert_eq!(export_states(&controller).await.unwrap().lines().count(), 1);
        assert_eq!(clear_data(&controller).await.unwrap(), 0);
        get_metrics(&controller, "quarter").await.unwrap();
    }

    #[tokio::test]
    async fn timeline_parses_rfc3339_bounds() {
        let controller = controller();
        let timeline = get_timeline(
            &controller,
            "2024-03-13T08:00:00-05:00",
            "2024-03-13T09:00:00-05:00",
        )
        .await
        .unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].duration_secs, 3_600.0);

        let err = get_timeline(&controller, "yesterday", "2024-03-13T09:00:00Z")
            .await
            .unwrap_err();
        assert!(err.contains("invalid start"));
    }
}
