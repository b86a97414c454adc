//! Blocked-interval collection: the time an owner cannot be booked.
//!
//! Blocked time is the union of confirmed bookings, single manual events and
//! the live occurrences of recurring manual events. Recurrence templates,
//! exception rows and booking-derived calendar entries are never counted
//! directly: templates and exceptions contribute through their expanded
//! occurrences, and derived entries duplicate their booking.

use rusqlite::Connection;

use crate::error::Result;
use crate::interval::{merge_intervals, Interval};
use crate::model::{Booking, EventLink, ManualEvent};
use crate::recurrence::{earliest_reaching_start, occurrences_overlapping, ExpandedOccurrence};
use crate::store;

/// Union of every blocked interval overlapping `range`, merged and sorted.
pub fn collect_blocked(
    bookings: &[Booking],
    events: &[ManualEvent],
    occurrences: &[ExpandedOccurrence],
    range: &Interval,
) -> Vec<Interval> {
    let from_bookings = bookings.iter().map(Booking::interval);
    let from_events = events
        .iter()
        .filter(|e| matches!(e.link, EventLink::Single))
        .filter_map(ManualEvent::interval);
    let from_occurrences = occurrences.iter().filter_map(ExpandedOccurrence::interval);

    merge_intervals(
        from_bookings
            .chain(from_events)
            .chain(from_occurrences)
            .filter(|i| i.overlaps(range)),
    )
}

/// Live recurring occurrences of `owner_id` visible in `range`, including
/// long ones that started earlier and modified ones moved into it.
pub fn load_live_occurrences(
    conn: &Connection,
    owner_id: &str,
    range: &Interval,
    max_occurrences_per_template: u16,
) -> Result<Vec<ExpandedOccurrence>> {
    let templates = store::templates_for_owner(conn, owner_id, range.end)?;
    let original_from = earliest_reaching_start(&templates, range);
    let exceptions = store::exceptions_reaching(conn, owner_id, original_from, range)?;
    Ok(occurrences_overlapping(
        &templates,
        &exceptions,
        range,
        max_occurrences_per_template,
    ))
}

/// Gather blocked time for `owner_id` over `range` from the store: bookings,
/// single events and live recurring occurrences.
pub fn load_blocked(
    conn: &Connection,
    owner_id: &str,
    range: &Interval,
    max_occurrences_per_template: u16,
) -> Result<Vec<Interval>> {
    let bookings = store::bookings_overlapping(conn, owner_id, range)?;
    let events = store::events_overlapping(conn, owner_id, range)?;
    let occurrences = load_live_occurrences(conn, owner_id, range, max_occurrences_per_template)?;

    let blocked = collect_blocked(&bookings, &events, &occurrences, range);
    tracing::debug!(
        owner_id,
        bookings = bookings.len(),
        events = events.len(),
        occurrences = occurrences.len(),
        blocked = blocked.len(),
        "collected blocked intervals"
    );
    Ok(blocked)
}
