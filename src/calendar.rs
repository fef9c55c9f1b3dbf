//! Local-time arithmetic shared by the classifier and the history queries.
//!
//! Everything is stored in UTC; a [`Calendar`] maps instants onto the plant's
//! wall clock (an IANA timezone, so daylight saving shifts are followed) and
//! knows which weekdays and hours count as working time.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingHours {
    pub weekdays: Vec<Weekday>,
    /// First working hour of the day (inclusive).
    pub start_hour: u32,
    /// Hour at which work stops (exclusive).
    pub end_hour: u32,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            start_hour: 7,
            end_hour: 17,
        }
    }
}

impl WorkingHours {
    pub fn validate(&self) -> Result<()> {
        if self.start_hour >= self.end_hour {
            bail!(
                "working hours start ({}) must be before end ({})",
                self.start_hour,
                self.end_hour
            );
        }
        if self.end_hour > 24 {
            bail!("working hours end ({}) is past midnight", self.end_hour);
        }
        if self.weekdays.is_empty() {
            bail!("working hours need at least one weekday");
        }
        Ok(())
    }

    pub fn hours(&self) -> std::ops::Range<u32> {
        self.start_hour..self.end_hour
    }
}

/// Named reporting period, always ending at "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Today,
    Week,
    Month,
    Quarter,
    Year,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Today => "today",
            Period::Week => "week",
            Period::Month => "month",
            Period::Quarter => "quarter",
            Period::Year => "year",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "today" => Ok(Period::Today),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "quarter" => Ok(Period::Quarter),
            "year" => Ok(Period::Year),
            _ => Err(anyhow!(
                "invalid period '{value}', expected today, week, month, quarter or year"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Calendar {
    tz: Tz,
    working_hours: WorkingHours,
}

impl Calendar {
    /// `timezone` is an IANA name such as `America/Chicago`.
    pub fn new(timezone: &str, working_hours: WorkingHours) -> Result<Self> {
        let tz = timezone
            .parse::<Tz>()
            .map_err(|err| anyhow!("unknown timezone '{timezone}': {err}"))?;
        working_hours.validate()?;
        Ok(Self { tz, working_hours })
    }

    /// UTC wall clock with the default Monday–Friday 07:00–17:00 window.
    pub fn utc() -> Self {
        Self {
            tz: Tz::UTC,
            working_hours: WorkingHours::default(),
        }
    }

    pub fn working_hours(&self) -> &WorkingHours {
        &self.working_hours
    }

    pub fn local(&self, instant: DateTime<Utc>) -> DateTime<Tz> {
        instant.with_timezone(&self.tz)
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local(instant).date_naive()
    }

    /// Ambiguous wall-clock times resolve to the earlier instant; times skipped
    /// by a forward shift resolve to the end of the gap.
    fn to_utc(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        let resolved = self.tz.from_local_datetime(&naive).earliest().or_else(|| {
            self.tz
                .from_local_datetime(&(naive + Duration::hours(1)))
                .earliest()
        });
        match resolved {
            Some(local) => local.with_timezone(&Utc),
            None => DateTime::from_naive_utc_and_offset(naive, Utc),
        }
    }

    /// Instant at which `hour` o'clock starts on the local `date`. `hour == 24`
    /// is the following midnight.
    pub fn at_hour(&self, date: NaiveDate, hour: u32) -> DateTime<Utc> {
        self.to_utc(date.and_time(NaiveTime::MIN) + Duration::hours(i64::from(hour)))
    }

    pub fn day_start(&self, date: NaiveDate) -> DateTime<Utc> {
        self.at_hour(date, 0)
    }

    /// `[midnight, next midnight)` of the local `date`.
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.at_hour(date, 0), self.at_hour(date, 24))
    }

    /// `[start_hour, end_hour)` of the local `date`.
    pub fn working_window(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            self.at_hour(date, self.working_hours.start_hour),
            self.at_hour(date, self.working_hours.end_hour),
        )
    }

    pub fn is_workday(&self, date: NaiveDate) -> bool {
        self.working_hours.weekdays.contains(&date.weekday())
    }

    pub fn is_working_time(&self, instant: DateTime<Utc>) -> bool {
        let date = self.local_date(instant);
        if !self.is_workday(date) {
            return false;
        }
        let (start, end) = self.working_window(date);
        start <= instant && instant < end
    }

    pub fn period_start(&self, period: Period, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let today = self.local_date(now);
        let first_day = match period {
            Period::Today => today,
            Period::Week => {
                today - Duration::days(i64::from(today.weekday().num_days_from_monday()))
            }
            Period::Month => NaiveDate::from_ymd_opt(today.year(), today.month(), 1)
                .ok_or_else(|| anyhow!("no first day of month for {today}"))?,
            Period::Quarter => {
                let quarter_month = ((today.month() - 1) / 3) * 3 + 1;
                NaiveDate::from_ymd_opt(today.year(), quarter_month, 1)
                    .ok_or_else(|| anyhow!("no first day of quarter for {today}"))?
            }
            Period::Year => NaiveDate::from_ymd_opt(today.year(), 1, 1)
                .ok_or_else(|| anyhow!("no first day of year for {today}"))?,
        };
        Ok(self.day_start(first_day))
    }

    /// Every local date from the one containing `start` through the one containing `end`.
    pub fn dates_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<NaiveDate> {
        let last = self.local_date(end);
        let mut dates = Vec::new();
        let mut current = self.local_date(start);
        while current <= last {
            dates.push(current);
            match current.succ_opt() {
                Some(next) => current = next,
                None => break,
            }
        }
        dates
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date '{value}', expected YYYY-MM-DD"))
}
