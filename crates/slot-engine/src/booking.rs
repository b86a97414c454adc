//! The booking commit guard.
//!
//! A booking attempt is either committed or rejected, never adjusted. Inside
//! one IMMEDIATE transaction the guard re-reads the schedule and the owner's
//! blocked time, re-checks the one requested interval against them, and only
//! then inserts the booking. A concurrent attempt for an overlapping interval
//! waits on the write lock, then sees the committed row and is rejected with
//! [`EngineError::Conflict`].
//!
//! The transaction handle is passed in by the caller; the guard never commits
//! it. Dropping the handle after an error rolls everything back.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use rusqlite::Transaction;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::blocked::load_blocked;
use crate::error::{EngineError, Result};
use crate::interval::{BlockedSet, Interval};
use crate::model::{BookerInfo, Booking, BookingRef, EventKind, EventLink, EventType, ManualEvent, Window};
use crate::slots::is_slot_bookable;
use crate::store;

/// A request to turn a chosen slot into a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub event_type_id: i64,
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
    pub booker: BookerInfo,
}

impl BookingRequest {
    /// Reject malformed input before touching the store.
    pub fn validate(&self) -> Result<()> {
        if self.duration_minutes == 0 {
            return Err(EngineError::Validation("duration must be positive".to_string()));
        }
        if self.start.second() != 0 || self.start.nanosecond() != 0 {
            return Err(EngineError::Validation(format!(
                "start {} must be on a whole minute",
                self.start.to_rfc3339()
            )));
        }
        if self.booker.name.trim().is_empty() || self.booker.email.trim().is_empty() {
            return Err(EngineError::Validation(
                "booker name and email are required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Interval {
        Interval::starting_at(self.start, self.duration_minutes)
    }
}

/// Every `(date, window)` pair that can contain a slot starting on `date`.
///
/// Overnight windows of the next date start on `date`, and a window whose end
/// wraps past midnight reaches into `date` from the previous one.
fn candidate_windows(
    windows_for: impl Fn(NaiveDate) -> Vec<Window>,
    date: NaiveDate,
) -> Vec<(NaiveDate, Window)> {
    [date.pred_opt(), Some(date), date.succ_opt()]
        .into_iter()
        .flatten()
        .flat_map(|d| windows_for(d).into_iter().map(move |w| (d, w)))
        .collect()
}

fn derived_event(event_type: &EventType, booking: &Booking) -> ManualEvent {
    ManualEvent {
        id: 0,
        owner_id: event_type.owner_id.clone(),
        title: format!("{} with {}", event_type.title, booking.booker.name),
        description: booking.booker.notes.clone(),
        kind: EventKind::Booking,
        start_time: booking.start_time,
        end_time: Some(booking.end_time),
        guests: vec![booking.booker.email.clone()],
        link: EventLink::Derived {
            booking_id: booking.id,
        },
    }
}

/// Re-check and insert a booking inside `tx`.
///
/// # Errors
///
/// - [`EngineError::Validation`] for a malformed request or a duration the
///   event type does not offer.
/// - [`EngineError::NotFound`] if the event type or its schedule is gone.
/// - [`EngineError::Conflict`] if the interval is no longer bookable.
pub fn commit_booking(
    tx: &Transaction<'_>,
    request: &BookingRequest,
    max_occurrences_per_template: u16,
    now: DateTime<Utc>,
) -> Result<Booking> {
    request.validate()?;

    let event_type = store::load_event_type(tx, request.event_type_id)?;
    if !event_type.durations.contains(&request.duration_minutes) {
        return Err(EngineError::Validation(format!(
            "duration {} is not offered by event type {}",
            request.duration_minutes, event_type.id
        )));
    }

    let slot = request.interval();
    let schedule = store::load_schedule_snapshot(tx, event_type.schedule_id)?;
    let windows = candidate_windows(|d| schedule.windows_for(d), slot.start.date_naive());

    let range = slot.widen(event_type.buffer_time);
    let blocked = load_blocked(tx, &event_type.owner_id, &range, max_occurrences_per_template)?;
    let blocked = BlockedSet::new(&blocked, event_type.buffer_time);

    if !is_slot_bookable(&windows, &blocked, &slot) {
        tracing::info!(
            event_type_id = event_type.id,
            start = %slot.start,
            end = %slot.end,
            "booking rejected: interval no longer available"
        );
        return Err(EngineError::Conflict {
            start: slot.start,
            end: slot.end,
        });
    }

    let token = Uuid::new_v4().to_string();
    let booking = store::insert_booking(tx, event_type.id, &slot, &request.booker, &token, now)?;
    store::insert_event(tx, None, &derived_event(&event_type, &booking))?;

    tracing::info!(
        booking_id = booking.id,
        event_type_id = event_type.id,
        start = %booking.start_time,
        "booking committed"
    );
    Ok(booking)
}

/// Delete a booking (and, by cascade, its calendar entry) inside `tx`.
///
/// # Errors
///
/// Returns [`EngineError::NotFound`] when no such booking exists, including
/// when it was already cancelled.
pub fn cancel_booking(tx: &Transaction<'_>, booking: &BookingRef) -> Result<Booking> {
    let found = store::find_booking(tx, booking)?
        .ok_or_else(|| EngineError::not_found("booking", booking))?;
    store::delete_booking(tx, found.id)?;

    tracing::info!(booking_id = found.id, "booking cancelled");
    Ok(found)
}
