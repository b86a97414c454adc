//! Plain data shapes exchanged with the owning collaborators.
//!
//! Rules, overrides, event types, bookings and manual events arrive from the
//! store (or a caller's own persistence) as these values; the engine never
//! holds them beyond a single request.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::interval::Interval;

// ── Time of day ─────────────────────────────────────────────────────────────

/// A UTC wall-clock time of day, written `HH:MM`.
///
/// Ordering matches the lexical ordering of the zero-padded `HH:MM` form, which
/// is what overnight detection compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(TimeOfDay)
    }

    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }
}

impl FromStr for TimeOfDay {
    type Err = EngineError;

    /// Accepts `HH:MM` and the `HH:MM:SS` form SQL time columns hand back.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        NaiveTime::parse_from_str(s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
            .map(TimeOfDay)
            .map_err(|_| EngineError::Validation(format!("invalid time of day '{s}', expected HH:MM")))
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

// ── Availability ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: i64,
    pub owner_id: String,
    pub name: String,
}

/// A weekly recurring window. `day_of_week` is 0 = Sunday .. 6 = Saturday (UTC).
///
/// When `start_time > end_time` the window crosses midnight: it begins on the
/// previous UTC day at `start_time` and ends on the rule's day at `end_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub day_of_week: u8,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
}

impl AvailabilityRule {
    pub fn validate(&self) -> Result<()> {
        if self.day_of_week > 6 {
            return Err(EngineError::Validation(format!(
                "day_of_week must be between 0 and 6, got {}",
                self.day_of_week
            )));
        }
        Ok(())
    }

    pub fn window(&self) -> Window {
        Window {
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

/// A per-date replacement for the weekly rules of one schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityOverride {
    pub schedule_id: i64,
    pub date: NaiveDate,
    #[serde(default)]
    pub is_unavailable: bool,
    #[serde(default)]
    pub start_time: Option<TimeOfDay>,
    #[serde(default)]
    pub end_time: Option<TimeOfDay>,
}

impl AvailabilityOverride {
    pub fn unavailable(schedule_id: i64, date: NaiveDate) -> Self {
        Self {
            schedule_id,
            date,
            is_unavailable: true,
            start_time: None,
            end_time: None,
        }
    }

    pub fn window(schedule_id: i64, date: NaiveDate, start: TimeOfDay, end: TimeOfDay) -> Self {
        Self {
            schedule_id,
            date,
            is_unavailable: false,
            start_time: Some(start),
            end_time: Some(end),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.is_unavailable && (self.start_time.is_none() || self.end_time.is_none()) {
            return Err(EngineError::Validation(
                "override needs both start_time and end_time unless is_unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

/// A time-of-day window that applies to one calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
}

impl Window {
    /// Whether the window starts on the previous UTC day.
    pub fn crosses_midnight(&self) -> bool {
        self.start_time > self.end_time
    }
}

// ── Event types and bookings ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventType {
    pub id: i64,
    pub owner_id: String,
    pub schedule_id: i64,
    pub title: String,
    /// Selectable durations in minutes.
    pub durations: Vec<u32>,
    pub default_duration: u32,
    /// Minutes applied to both sides of every blocked interval for this event type.
    #[serde(default)]
    pub buffer_time: u32,
}

impl EventType {
    pub fn validate(&self) -> Result<()> {
        if self.durations.is_empty() || self.durations.contains(&0) {
            return Err(EngineError::Validation(format!(
                "event type {} needs at least one positive duration",
                self.id
            )));
        }
        if !self.durations.contains(&self.default_duration) {
            return Err(EngineError::Validation(format!(
                "default duration {} is not one of the durations of event type {}",
                self.default_duration, self.id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookerInfo {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub event_type_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(flatten)]
    pub booker: BookerInfo,
    pub cancellation_token: String,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn interval(&self) -> Interval {
        Interval::new(self.start_time, self.end_time)
    }
}

/// How a cancellation request names its booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingRef {
    Id(i64),
    Token(String),
}

impl fmt::Display for BookingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingRef::Id(id) => write!(f, "{id}"),
            BookingRef::Token(token) => write!(f, "token {token}"),
        }
    }
}

// ── Manual events and recurrence ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    #[default]
    Personal,
    Blocked,
    Booking,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Personal => "personal",
            EventKind::Blocked => "blocked",
            EventKind::Booking => "booking",
        }
    }
}

impl FromStr for EventKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "personal" => Ok(EventKind::Personal),
            "blocked" => Ok(EventKind::Blocked),
            "booking" => Ok(EventKind::Booking),
            other => Err(EngineError::Validation(format!("unknown event type '{other}'"))),
        }
    }
}

/// The role a manual event row plays.
///
/// Storage keeps this as nullable foreign-key columns; in memory it is one tag.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum EventLink {
    /// A plain, non-recurring event.
    #[default]
    Single,
    /// A recurrence template. Only its expanded occurrences block or display.
    Template { recurrence_id: i64 },
    /// An edit or cancellation of one occurrence of a template.
    Exception {
        parent_event_id: i64,
        original_start_time: DateTime<Utc>,
        #[serde(default)]
        is_cancelled: bool,
    },
    /// The calendar entry derived from a booking; removed with it.
    Derived { booking_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualEvent {
    pub id: i64,
    pub owner_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: EventKind,
    pub start_time: DateTime<Utc>,
    /// `None` for point events.
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub guests: Vec<String>,
    #[serde(default)]
    pub link: EventLink,
}

impl ManualEvent {
    /// The span this event covers; point events cover none.
    pub fn interval(&self) -> Option<Interval> {
        self.end_time
            .map(|end| Interval::new(self.start_time, end))
            .filter(|i| !i.is_empty())
    }
}

/// A stored recurrence rule. `frequency` and `by_day` are kept as written and
/// only interpreted during expansion, so a bad rule affects its template alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub id: i64,
    pub frequency: String,
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Last date (inclusive) on which an occurrence may start.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Comma-joined weekday tokens (`SU,MO,..`), meaningful for WEEKLY only.
    #[serde(default)]
    pub by_day: Option<String>,
}

fn default_interval() -> u32 {
    1
}

/// A template event joined with its recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringTemplate {
    pub event: ManualEvent,
    pub rule: RecurrenceRule,
}

impl RecurringTemplate {
    /// How long each occurrence lasts; zero for point templates.
    pub fn span(&self) -> Duration {
        self.event
            .interval()
            .map_or(Duration::zero(), |i| i.end - i.start)
    }
}
