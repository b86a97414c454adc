//! SQLite persistence for schedules, event types, bookings and manual events.
//!
//! Read and write helpers take a plain `&Connection`, so the same query runs
//! against the store's connection or inside a caller's [`Transaction`]
//! (which derefs to a connection). The booking write path only ever runs
//! inside an IMMEDIATE transaction obtained from [`Store::begin_write`].
//!
//! Instants are stored as RFC 3339 UTC text at second precision, which sorts
//! lexically in time order; dates as `YYYY-MM-DD`, times of day as `HH:MM`.

use std::path::Path;
use std::time::Duration as StdDuration;

use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::interval::Interval;
use crate::model::{
    AvailabilityOverride, AvailabilityRule, BookerInfo, Booking, BookingRef, EventLink,
    EventType, ManualEvent, RecurrenceRule, RecurringTemplate, Schedule,
};
use crate::resolver::ScheduleSnapshot;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS schedules (
    id INTEGER PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS availability_rules (
    id INTEGER PRIMARY KEY,
    schedule_id INTEGER NOT NULL REFERENCES schedules(id) ON DELETE CASCADE,
    day_of_week INTEGER NOT NULL CHECK (day_of_week BETWEEN 0 AND 6),
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_rules_schedule ON availability_rules(schedule_id);

CREATE TABLE IF NOT EXISTS availability_overrides (
    id INTEGER PRIMARY KEY,
    schedule_id INTEGER NOT NULL REFERENCES schedules(id) ON DELETE CASCADE,
    date TEXT NOT NULL,
    is_unavailable INTEGER NOT NULL DEFAULT 0,
    start_time TEXT,
    end_time TEXT,
    UNIQUE (schedule_id, date)
);

CREATE TABLE IF NOT EXISTS event_types (
    id INTEGER PRIMARY KEY,
    owner_id TEXT NOT NULL,
    schedule_id INTEGER NOT NULL REFERENCES schedules(id),
    title TEXT NOT NULL,
    durations TEXT NOT NULL,
    default_duration INTEGER NOT NULL,
    buffer_time INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS bookings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type_id INTEGER NOT NULL REFERENCES event_types(id),
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    booker_name TEXT NOT NULL,
    booker_email TEXT NOT NULL,
    notes TEXT,
    cancellation_token TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_bookings_event_type_start ON bookings(event_type_id, start_time);

CREATE TABLE IF NOT EXISTS recurrence_rules (
    id INTEGER PRIMARY KEY,
    frequency TEXT NOT NULL,
    repeat_interval INTEGER NOT NULL DEFAULT 1,
    end_date TEXT,
    by_day TEXT
);

CREATE TABLE IF NOT EXISTS manual_events (
    id INTEGER PRIMARY KEY,
    owner_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    kind TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT,
    guests TEXT NOT NULL DEFAULT '[]',
    recurrence_id INTEGER REFERENCES recurrence_rules(id),
    parent_event_id INTEGER REFERENCES manual_events(id) ON DELETE CASCADE,
    original_start_time TEXT,
    is_cancelled INTEGER NOT NULL DEFAULT 0,
    booking_id INTEGER REFERENCES bookings(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_manual_events_owner_start ON manual_events(owner_id, start_time);
CREATE INDEX IF NOT EXISTS idx_manual_events_parent ON manual_events(parent_event_id, original_start_time);
";

const EVENT_COLUMNS: &str = "id, owner_id, title, description, kind, start_time, end_time, guests, \
     recurrence_id, parent_event_id, original_start_time, is_cancelled, booking_id";

const BOOKING_COLUMNS: &str = "b.id, b.event_type_id, b.start_time, b.end_time, b.booker_name, \
     b.booker_email, b.notes, b.cancellation_token, b.created_at";

// ── Value encoding ──────────────────────────────────────────────────────────

pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("invalid timestamp '{raw}': {e}")))
}

fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(idx, &raw)
}

fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| parse_ts(idx, &r)).transpose()
}

fn get_parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: T::Err| conversion_error(idx, format!("invalid value '{raw}': {e}")))
}

fn get_opt_parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| {
        r.parse()
            .map_err(|e: T::Err| conversion_error(idx, format!("invalid value '{r}': {e}")))
    })
    .transpose()
}

fn get_json<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, format!("invalid JSON: {e}")))
}

// ── Row mapping ─────────────────────────────────────────────────────────────

fn schedule_from_row(row: &Row<'_>) -> rusqlite::Result<Schedule> {
    Ok(Schedule {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
    })
}

fn event_type_from_row(row: &Row<'_>) -> rusqlite::Result<EventType> {
    Ok(EventType {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        schedule_id: row.get(2)?,
        title: row.get(3)?,
        durations: get_json(row, 4)?,
        default_duration: row.get(5)?,
        buffer_time: row.get(6)?,
    })
}

fn booking_from_row(row: &Row<'_>) -> rusqlite::Result<Booking> {
    Ok(Booking {
        id: row.get(0)?,
        event_type_id: row.get(1)?,
        start_time: get_ts(row, 2)?,
        end_time: get_ts(row, 3)?,
        booker: BookerInfo {
            name: row.get(4)?,
            email: row.get(5)?,
            notes: row.get(6)?,
        },
        cancellation_token: row.get(7)?,
        created_at: get_ts(row, 8)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<ManualEvent> {
    let recurrence_id: Option<i64> = row.get(8)?;
    let parent_event_id: Option<i64> = row.get(9)?;
    let booking_id: Option<i64> = row.get(12)?;

    let link = match (recurrence_id, parent_event_id, booking_id) {
        (_, Some(parent_event_id), _) => EventLink::Exception {
            parent_event_id,
            original_start_time: get_opt_ts(row, 10)?.ok_or_else(|| {
                conversion_error(10, "exception row without original_start_time".to_string())
            })?,
            is_cancelled: row.get(11)?,
        },
        (Some(recurrence_id), None, _) => EventLink::Template { recurrence_id },
        (None, None, Some(booking_id)) => EventLink::Derived { booking_id },
        (None, None, None) => EventLink::Single,
    };

    Ok(ManualEvent {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        kind: get_parsed(row, 4)?,
        start_time: get_ts(row, 5)?,
        end_time: get_opt_ts(row, 6)?,
        guests: get_json(row, 7)?,
        link,
    })
}

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<AvailabilityRule> {
    Ok(AvailabilityRule {
        day_of_week: row.get(0)?,
        start_time: get_parsed(row, 1)?,
        end_time: get_parsed(row, 2)?,
    })
}

fn override_from_row(row: &Row<'_>) -> rusqlite::Result<AvailabilityOverride> {
    Ok(AvailabilityOverride {
        schedule_id: row.get(0)?,
        date: get_parsed(row, 1)?,
        is_unavailable: row.get(2)?,
        start_time: get_opt_parsed(row, 3)?,
        end_time: get_opt_parsed(row, 4)?,
    })
}

// ── Queries ─────────────────────────────────────────────────────────────────

pub(crate) fn load_schedule(conn: &Connection, schedule_id: i64) -> Result<Schedule> {
    conn.query_row(
        "SELECT id, owner_id, name FROM schedules WHERE id = ?1",
        params![schedule_id],
        schedule_from_row,
    )
    .optional()?
    .ok_or_else(|| EngineError::not_found("schedule", schedule_id))
}

/// The schedule with all of its rules and overrides.
pub(crate) fn load_schedule_snapshot(conn: &Connection, schedule_id: i64) -> Result<ScheduleSnapshot> {
    let schedule = load_schedule(conn, schedule_id)?;

    let mut stmt = conn.prepare(
        "SELECT day_of_week, start_time, end_time FROM availability_rules
         WHERE schedule_id = ?1 ORDER BY day_of_week, start_time, id",
    )?;
    let rules = stmt
        .query_map(params![schedule_id], rule_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT schedule_id, date, is_unavailable, start_time, end_time
         FROM availability_overrides WHERE schedule_id = ?1",
    )?;
    let overrides = stmt
        .query_map(params![schedule_id], override_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(ScheduleSnapshot::new(schedule, rules, overrides))
}

pub(crate) fn load_event_type(conn: &Connection, event_type_id: i64) -> Result<EventType> {
    conn.query_row(
        "SELECT id, owner_id, schedule_id, title, durations, default_duration, buffer_time
         FROM event_types WHERE id = ?1",
        params![event_type_id],
        event_type_from_row,
    )
    .optional()?
    .ok_or_else(|| EngineError::not_found("event type", event_type_id))
}

/// Bookings on any of `owner_id`'s event types that overlap `range`.
pub(crate) fn bookings_overlapping(
    conn: &Connection,
    owner_id: &str,
    range: &Interval,
) -> Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings b
         JOIN event_types et ON et.id = b.event_type_id
         WHERE et.owner_id = ?1 AND b.start_time < ?3 AND b.end_time > ?2
         ORDER BY b.start_time, b.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let bookings = stmt
        .query_map(params![owner_id, ts(range.start), ts(range.end)], booking_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(bookings)
}

/// Single and booking-derived events of `owner_id` overlapping `range`.
///
/// Point events are included when their instant lies inside the range.
pub(crate) fn events_overlapping(
    conn: &Connection,
    owner_id: &str,
    range: &Interval,
) -> Result<Vec<ManualEvent>> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM manual_events
         WHERE owner_id = ?1 AND recurrence_id IS NULL AND parent_event_id IS NULL
           AND start_time < ?3
           AND (end_time > ?2 OR (end_time IS NULL AND start_time >= ?2))
         ORDER BY start_time, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let events = stmt
        .query_map(params![owner_id, ts(range.start), ts(range.end)], event_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(events)
}

/// Every recurrence template of `owner_id` that starts no later than `until`.
pub(crate) fn templates_for_owner(
    conn: &Connection,
    owner_id: &str,
    until: DateTime<Utc>,
) -> Result<Vec<RecurringTemplate>> {
    let sql = format!(
        "SELECT {cols}, r.id, r.frequency, r.repeat_interval, r.end_date, r.by_day
         FROM manual_events e
         JOIN recurrence_rules r ON r.id = e.recurrence_id
         WHERE e.owner_id = ?1 AND e.parent_event_id IS NULL AND e.start_time <= ?2
         ORDER BY e.start_time, e.id",
        cols = EVENT_COLUMNS
            .split(", ")
            .map(|c| format!("e.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let templates = stmt
        .query_map(params![owner_id, ts(until)], |row| {
            Ok(RecurringTemplate {
                event: event_from_row(row)?,
                rule: RecurrenceRule {
                    id: row.get(13)?,
                    frequency: row.get(14)?,
                    interval: row.get(15)?,
                    end_date: get_opt_parsed::<NaiveDate>(row, 16)?,
                    by_day: row.get(17)?,
                },
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(templates)
}

/// Exception rows of `owner_id` whose original occurrence lies in `[start, end]`.
pub(crate) fn exceptions_for_owner(
    conn: &Connection,
    owner_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<ManualEvent>> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM manual_events
         WHERE owner_id = ?1 AND parent_event_id IS NOT NULL
           AND original_start_time >= ?2 AND original_start_time <= ?3
         ORDER BY original_start_time, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let exceptions = stmt
        .query_map(params![owner_id, ts(start), ts(end)], event_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(exceptions)
}

/// Exception rows of `owner_id` that can affect `range`: those whose original
/// occurrence lies in `[original_from, range.end]`, and those whose own time
/// is visible in `range` wherever their original occurrence was.
pub(crate) fn exceptions_reaching(
    conn: &Connection,
    owner_id: &str,
    original_from: DateTime<Utc>,
    range: &Interval,
) -> Result<Vec<ManualEvent>> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM manual_events
         WHERE owner_id = ?1 AND parent_event_id IS NOT NULL
           AND ((original_start_time >= ?2 AND original_start_time <= ?4)
             OR (start_time < ?4
                 AND (end_time > ?3 OR (end_time IS NULL AND start_time >= ?3))))
         ORDER BY original_start_time, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let exceptions = stmt
        .query_map(
            params![owner_id, ts(original_from), ts(range.start), ts(range.end)],
            event_from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(exceptions)
}

pub(crate) fn find_booking(conn: &Connection, booking: &BookingRef) -> Result<Option<Booking>> {
    let found = match booking {
        BookingRef::Id(id) => conn
            .query_row(
                &format!("SELECT {BOOKING_COLUMNS} FROM bookings b WHERE b.id = ?1"),
                params![id],
                booking_from_row,
            )
            .optional()?,
        BookingRef::Token(token) => conn
            .query_row(
                &format!("SELECT {BOOKING_COLUMNS} FROM bookings b WHERE b.cancellation_token = ?1"),
                params![token],
                booking_from_row,
            )
            .optional()?,
    };
    Ok(found)
}

// ── Writes ──────────────────────────────────────────────────────────────────

pub(crate) fn insert_schedule(conn: &Connection, schedule: &Schedule) -> Result<()> {
    conn.execute(
        "INSERT INTO schedules (id, owner_id, name) VALUES (?1, ?2, ?3)",
        params![schedule.id, schedule.owner_id, schedule.name],
    )?;
    Ok(())
}

/// Replace every weekly rule of a schedule.
pub(crate) fn replace_rules(
    conn: &Connection,
    schedule_id: i64,
    rules: &[AvailabilityRule],
) -> Result<()> {
    conn.execute(
        "DELETE FROM availability_rules WHERE schedule_id = ?1",
        params![schedule_id],
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO availability_rules (schedule_id, day_of_week, start_time, end_time)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for rule in rules {
        stmt.execute(params![
            schedule_id,
            rule.day_of_week,
            rule.start_time.to_string(),
            rule.end_time.to_string(),
        ])?;
    }
    Ok(())
}

/// Insert or replace the override on its `(schedule_id, date)` key.
pub(crate) fn upsert_override(conn: &Connection, o: &AvailabilityOverride) -> Result<()> {
    conn.execute(
        "INSERT INTO availability_overrides (schedule_id, date, is_unavailable, start_time, end_time)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (schedule_id, date) DO UPDATE SET
             is_unavailable = excluded.is_unavailable,
             start_time = excluded.start_time,
             end_time = excluded.end_time",
        params![
            o.schedule_id,
            o.date.to_string(),
            o.is_unavailable,
            o.start_time.map(|t| t.to_string()),
            o.end_time.map(|t| t.to_string()),
        ],
    )?;
    Ok(())
}

/// Remove the override for a date. Returns whether one existed.
pub(crate) fn delete_override(conn: &Connection, schedule_id: i64, date: NaiveDate) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM availability_overrides WHERE schedule_id = ?1 AND date = ?2",
        params![schedule_id, date.to_string()],
    )?;
    Ok(deleted > 0)
}

pub(crate) fn insert_event_type(conn: &Connection, event_type: &EventType) -> Result<()> {
    conn.execute(
        "INSERT INTO event_types (id, owner_id, schedule_id, title, durations, default_duration, buffer_time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event_type.id,
            event_type.owner_id,
            event_type.schedule_id,
            event_type.title,
            serde_json::to_string(&event_type.durations)?,
            event_type.default_duration,
            event_type.buffer_time,
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_recurrence_rule(conn: &Connection, rule: &RecurrenceRule) -> Result<()> {
    conn.execute(
        "INSERT INTO recurrence_rules (id, frequency, repeat_interval, end_date, by_day)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            rule.id,
            rule.frequency,
            rule.interval,
            rule.end_date.map(|d| d.to_string()),
            rule.by_day,
        ],
    )?;
    Ok(())
}

/// Insert a manual event. An `id` of `None` lets SQLite assign one.
pub(crate) fn insert_event(conn: &Connection, id: Option<i64>, event: &ManualEvent) -> Result<i64> {
    let (recurrence_id, parent_event_id, original_start_time, is_cancelled, booking_id) =
        match &event.link {
            EventLink::Single => (None, None, None, false, None),
            EventLink::Template { recurrence_id } => (Some(*recurrence_id), None, None, false, None),
            EventLink::Exception {
                parent_event_id,
                original_start_time,
                is_cancelled,
            } => (
                None,
                Some(*parent_event_id),
                Some(ts(*original_start_time)),
                *is_cancelled,
                None,
            ),
            EventLink::Derived { booking_id } => (None, None, None, false, Some(*booking_id)),
        };

    conn.execute(
        "INSERT INTO manual_events (id, owner_id, title, description, kind, start_time, end_time,
             guests, recurrence_id, parent_event_id, original_start_time, is_cancelled, booking_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            id,
            event.owner_id,
            event.title,
            event.description,
            event.kind.as_str(),
            ts(event.start_time),
            event.end_time.map(ts),
            serde_json::to_string(&event.guests)?,
            recurrence_id,
            parent_event_id,
            original_start_time,
            is_cancelled,
            booking_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn insert_booking(
    conn: &Connection,
    event_type_id: i64,
    slot: &Interval,
    booker: &BookerInfo,
    cancellation_token: &str,
    created_at: DateTime<Utc>,
) -> Result<Booking> {
    // Stored at second precision; return what a later read will see.
    let created_at = created_at.trunc_subsecs(0);
    conn.execute(
        "INSERT INTO bookings (event_type_id, start_time, end_time, booker_name, booker_email,
             notes, cancellation_token, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            event_type_id,
            ts(slot.start),
            ts(slot.end),
            booker.name,
            booker.email,
            booker.notes,
            cancellation_token,
            ts(created_at),
        ],
    )?;
    Ok(Booking {
        id: conn.last_insert_rowid(),
        event_type_id,
        start_time: slot.start,
        end_time: slot.end,
        booker: booker.clone(),
        cancellation_token: cancellation_token.to_string(),
        created_at,
    })
}

pub(crate) fn delete_booking(conn: &Connection, booking_id: i64) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM bookings WHERE id = ?1", params![booking_id])?;
    Ok(deleted > 0)
}

// ── Store ───────────────────────────────────────────────────────────────────

/// A SQLite-backed store.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>, config: &EngineConfig) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(StdDuration::from_millis(config.busy_timeout_ms))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::with_connection(conn)
    }

    /// An in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Start a write transaction that takes the database write lock up front.
    ///
    /// Two IMMEDIATE transactions cannot run at once, so a check made inside
    /// one still holds when it commits.
    pub fn begin_write(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}
