//! Month scanning: which days of a month have at least one bookable slot.
//!
//! This is an existence check, not an enumeration. Each day stops at its first
//! bookable start (see [`first_slot`]) and the blocked-time index is built once
//! for the whole month, so a busy month costs a binary search per probe
//! instead of a full stride walk per day.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::interval::{BlockedSet, Interval};
use crate::resolver::ScheduleSnapshot;
use crate::slots::first_slot;

/// Days of slack on each side of the month when gathering blocked time, so
/// overnight windows and buffers that spill across the month edges are seen.
pub const MONTH_SLACK_DAYS: i64 = 1;

/// A calendar month, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|_| Self { year, month })
            .ok_or_else(|| EngineError::Validation(format!("invalid month {year:04}-{month:02}")))
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// First day of the following month.
    pub fn next_first_day(&self) -> NaiveDate {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MAX)
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.next_first_day();
        self.first_day().iter_days().take_while(move |d| *d < end)
    }

    /// The range to gather blocked intervals for, including the slack days.
    pub fn blocked_range(&self) -> Interval {
        let slack = Duration::days(MONTH_SLACK_DAYS);
        Interval::new(
            self.first_day().and_time(chrono::NaiveTime::MIN).and_utc() - slack,
            self.next_first_day().and_time(chrono::NaiveTime::MIN).and_utc() + slack,
        )
    }
}

impl FromStr for YearMonth {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || EngineError::Validation(format!("malformed month '{s}', expected YYYY-MM"));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        YearMonth::new(year, month)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Day numbers (1-based) of `month` with at least one bookable slot of
/// `default_duration` minutes.
///
/// `blocked` should cover [`YearMonth::blocked_range`].
pub fn compute_month_availability(
    schedule: &ScheduleSnapshot,
    month: YearMonth,
    blocked: &[Interval],
    default_duration: u32,
    buffer_minutes: u32,
) -> Vec<u32> {
    let blocked = BlockedSet::new(blocked, buffer_minutes);

    let days: Vec<u32> = month
        .days()
        .filter(|date| {
            let windows = schedule.windows_for(*date);
            !windows.is_empty() && first_slot(*date, &windows, &blocked, default_duration).is_some()
        })
        .map(|date| date.day())
        .collect();

    tracing::debug!(
        schedule_id = schedule.schedule.id,
        %month,
        available_days = days.len(),
        "scanned month availability"
    );
    days
}
