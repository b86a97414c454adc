//! The [`BookingEngine`] facade: every read and write operation over one store.
//!
//! Read operations build a snapshot (schedule, blocked intervals) from the
//! store and hand it to the pure components. Writes go through
//! [`Store::begin_write`] and commit only when every step succeeded.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::blocked::{load_blocked, load_live_occurrences};
use crate::booking::{self, BookingRequest};
use crate::config::EngineConfig;
use crate::dataset::{import_into, Dataset, ImportSummary};
use crate::error::{EngineError, Result};
use crate::interval::{BlockedSet, Interval};
use crate::model::{AvailabilityOverride, AvailabilityRule, Booking, BookingRef, ManualEvent, Window};
use crate::month::{self, YearMonth};
use crate::recurrence::{self, ExpandedOccurrence};
use crate::slots;
use crate::store::{self, Store};

/// One entry of an owner's calendar view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CalendarItem {
    /// A stored single event or a booking's calendar entry.
    Event(ManualEvent),
    /// A live occurrence of a recurring event.
    Occurrence(ExpandedOccurrence),
}

impl CalendarItem {
    pub fn start_time(&self) -> DateTime<Utc> {
        match self {
            CalendarItem::Event(e) => e.start_time,
            CalendarItem::Occurrence(o) => o.start_time,
        }
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        match self {
            CalendarItem::Event(e) => e.end_time,
            CalendarItem::Occurrence(o) => o.end_time,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            CalendarItem::Event(e) => &e.title,
            CalendarItem::Occurrence(o) => &o.title,
        }
    }
}

/// Every instant a slot starting on `date` can touch: overnight windows begin
/// the day before, and a wrapped window ends the day after.
fn day_reach(date: NaiveDate) -> Interval {
    let midnight = date.and_time(NaiveTime::MIN).and_utc();
    Interval::new(midnight - Duration::days(1), midnight + Duration::days(2))
}

pub struct BookingEngine {
    store: Store,
    config: EngineConfig,
}

impl BookingEngine {
    /// Open the database named by `config.database_path`.
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = Store::open(&config.database_path, &config)?;
        Ok(Self { store, config })
    }

    /// An engine over a fresh in-memory database with default configuration.
    pub fn in_memory() -> Result<Self> {
        Self::with_store(Store::open_in_memory()?, EngineConfig::default())
    }

    pub fn with_store(store: Store, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // ── Availability ────────────────────────────────────────────────────────

    /// The windows that apply to `date` for a schedule.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn resolve_day(&self, schedule_id: i64, date: NaiveDate) -> Result<Vec<Window>> {
        let snapshot = store::load_schedule_snapshot(self.store.connection(), schedule_id)?;
        let windows = snapshot.windows_for(date);
        tracing::debug!(windows = windows.len(), "resolved day");
        Ok(windows)
    }

    /// Bookable starts on `date` against caller-supplied blocked intervals.
    #[tracing::instrument(skip(self, blocked), level = "debug")]
    pub fn compute_day_slots(
        &self,
        schedule_id: i64,
        date: NaiveDate,
        durations: &[u32],
        blocked: &[Interval],
        buffer_minutes: u32,
    ) -> Result<Vec<DateTime<Utc>>> {
        let windows = self.resolve_day(schedule_id, date)?;
        Ok(slots::compute_day_slots(
            date,
            &windows,
            blocked,
            durations,
            buffer_minutes,
        ))
    }

    /// Day numbers of `year_month` with a bookable slot, against
    /// caller-supplied blocked intervals.
    #[tracing::instrument(skip(self, blocked), level = "debug")]
    pub fn compute_month_availability(
        &self,
        schedule_id: i64,
        year_month: &str,
        blocked: &[Interval],
        default_duration: u32,
        buffer_minutes: u32,
    ) -> Result<Vec<u32>> {
        let month: YearMonth = year_month.parse()?;
        if default_duration == 0 {
            return Err(EngineError::Validation(
                "default duration must be positive".to_string(),
            ));
        }
        let snapshot = store::load_schedule_snapshot(self.store.connection(), schedule_id)?;
        Ok(month::compute_month_availability(
            &snapshot,
            month,
            blocked,
            default_duration,
            buffer_minutes,
        ))
    }

    /// Bookable starts on `date` for an event type, with blocked time read
    /// from the store. `duration` defaults to the event type's default.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn available_slots(
        &self,
        event_type_id: i64,
        date: NaiveDate,
        duration: Option<u32>,
    ) -> Result<Vec<DateTime<Utc>>> {
        let conn = self.store.connection();
        let event_type = store::load_event_type(conn, event_type_id)?;
        let duration = duration.unwrap_or(event_type.default_duration);
        if !event_type.durations.contains(&duration) {
            return Err(EngineError::Validation(format!(
                "duration {duration} is not offered by event type {event_type_id}"
            )));
        }

        let snapshot = store::load_schedule_snapshot(conn, event_type.schedule_id)?;
        let windows = snapshot.windows_for(date);
        if windows.is_empty() {
            return Ok(Vec::new());
        }

        let range = day_reach(date).widen(event_type.buffer_time);
        let blocked = load_blocked(
            conn,
            &event_type.owner_id,
            &range,
            self.config.max_occurrences_per_template,
        )?;
        let blocked = BlockedSet::new(&blocked, event_type.buffer_time);
        Ok(slots::day_slots(date, &windows, &blocked, &[duration]))
    }

    /// Day numbers of `year_month` with a bookable slot of the event type's
    /// default duration, with blocked time read from the store.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn month_availability(&self, event_type_id: i64, year_month: &str) -> Result<Vec<u32>> {
        let month: YearMonth = year_month.parse()?;
        let conn = self.store.connection();
        let event_type = store::load_event_type(conn, event_type_id)?;
        let snapshot = store::load_schedule_snapshot(conn, event_type.schedule_id)?;

        let range = month.blocked_range().widen(event_type.buffer_time);
        let blocked = load_blocked(
            conn,
            &event_type.owner_id,
            &range,
            self.config.max_occurrences_per_template,
        )?;
        Ok(month::compute_month_availability(
            &snapshot,
            month,
            &blocked,
            event_type.default_duration,
            event_type.buffer_time,
        ))
    }

    // ── Recurring events and the calendar view ──────────────────────────────

    /// Live occurrences of `owner_id`'s recurring events starting within
    /// `[range_start, range_end]`.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn expand_occurrences(
        &self,
        owner_id: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<ExpandedOccurrence>> {
        if range_end < range_start {
            return Err(EngineError::Validation(
                "range end is before range start".to_string(),
            ));
        }
        let conn = self.store.connection();
        let templates = store::templates_for_owner(conn, owner_id, range_end)?;
        let exceptions = store::exceptions_for_owner(conn, owner_id, range_start, range_end)?;
        Ok(recurrence::expand_occurrences(
            &templates,
            &exceptions,
            range_start,
            range_end,
            self.config.max_occurrences_per_template,
        ))
    }

    /// Everything on `owner_id`'s calendar that overlaps `range`, sorted by start.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn calendar(&self, owner_id: &str, range: &Interval) -> Result<Vec<CalendarItem>> {
        let conn = self.store.connection();
        let events = store::events_overlapping(conn, owner_id, range)?;
        let occurrences = load_live_occurrences(
            conn,
            owner_id,
            range,
            self.config.max_occurrences_per_template,
        )?;

        let mut items: Vec<CalendarItem> = events
            .into_iter()
            .map(CalendarItem::Event)
            .chain(occurrences.into_iter().map(CalendarItem::Occurrence))
            .collect();
        items.sort_by_key(CalendarItem::start_time);
        Ok(items)
    }

    // ── Bookings ────────────────────────────────────────────────────────────

    /// Re-check and commit a booking, or reject it with [`EngineError::Conflict`].
    #[tracing::instrument(skip(self), fields(event_type_id = request.event_type_id))]
    pub fn commit_booking(&mut self, request: &BookingRequest) -> Result<Booking> {
        let max_occurrences = self.config.max_occurrences_per_template;
        let tx = self.store.begin_write()?;
        let booking = booking::commit_booking(&tx, request, max_occurrences, Utc::now())?;
        tx.commit()?;
        Ok(booking)
    }

    /// Delete a booking by id or cancellation token.
    #[tracing::instrument(skip(self))]
    pub fn cancel_booking(&mut self, booking: &BookingRef) -> Result<Booking> {
        let tx = self.store.begin_write()?;
        let cancelled = booking::cancel_booking(&tx, booking)?;
        tx.commit()?;
        Ok(cancelled)
    }

    // ── Schedule maintenance ────────────────────────────────────────────────

    /// Replace every weekly rule of a schedule owned by `owner_id`.
    #[tracing::instrument(skip(self, rules), fields(rules = rules.len()))]
    pub fn replace_rules(
        &mut self,
        owner_id: &str,
        schedule_id: i64,
        rules: &[AvailabilityRule],
    ) -> Result<()> {
        for rule in rules {
            rule.validate()?;
        }
        let tx = self.store.begin_write()?;
        ensure_schedule_owner(&tx, owner_id, schedule_id)?;
        store::replace_rules(&tx, schedule_id, rules)?;
        tx.commit()?;
        Ok(())
    }

    /// Insert or replace the override for its `(schedule_id, date)`.
    #[tracing::instrument(skip(self))]
    pub fn set_override(&mut self, owner_id: &str, date_override: &AvailabilityOverride) -> Result<()> {
        date_override.validate()?;
        let tx = self.store.begin_write()?;
        ensure_schedule_owner(&tx, owner_id, date_override.schedule_id)?;
        store::upsert_override(&tx, date_override)?;
        tx.commit()?;
        Ok(())
    }

    /// Remove the override for a date, falling back to weekly rules.
    #[tracing::instrument(skip(self))]
    pub fn clear_override(&mut self, owner_id: &str, schedule_id: i64, date: NaiveDate) -> Result<()> {
        let tx = self.store.begin_write()?;
        ensure_schedule_owner(&tx, owner_id, schedule_id)?;
        if !store::delete_override(&tx, schedule_id, date)? {
            return Err(EngineError::not_found(
                "override",
                format!("{schedule_id}/{date}"),
            ));
        }
        tx.commit()?;
        Ok(())
    }

    /// Load a dataset in one transaction; nothing is written if any row fails.
    #[tracing::instrument(skip(self, dataset))]
    pub fn import(&mut self, dataset: &Dataset) -> Result<ImportSummary> {
        let tx = self.store.begin_write()?;
        let summary = import_into(&tx, dataset)?;
        tx.commit()?;
        tracing::info!(?summary, "dataset imported");
        Ok(summary)
    }
}

/// A schedule owned by someone else is reported exactly like a missing one.
fn ensure_schedule_owner(conn: &rusqlite::Connection, owner_id: &str, schedule_id: i64) -> Result<()> {
    let schedule = store::load_schedule(conn, schedule_id)?;
    if schedule.owner_id != owner_id {
        return Err(EngineError::not_found("schedule", schedule_id));
    }
    Ok(())
}
