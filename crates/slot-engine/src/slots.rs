//! Slot generation for a single calendar date.
//!
//! Each resolved window is anchored to absolute instants, then walked at a
//! fixed 15-minute stride. A stride position is emitted when at least one
//! candidate duration fits inside the window without touching buffered
//! blocked time. The stride never depends on the requested duration: a coarser
//! walk could step over a gap next to a blocked interval and miss a valid start.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::interval::{BlockedSet, Interval};
use crate::model::Window;

/// Distance between consecutive candidate slot starts.
pub const SLOT_STRIDE_MINUTES: i64 = 15;

fn stride() -> Duration {
    Duration::minutes(SLOT_STRIDE_MINUTES)
}

/// Anchor a window to absolute instants for `date`.
///
/// A window whose start sorts after its end starts on the previous UTC day. If
/// the anchored end is still not after the start (e.g. `09:00-09:00`), the end
/// moves forward one day. Returns `None` only at the edge of the calendar.
pub fn window_interval(date: NaiveDate, window: &Window) -> Option<Interval> {
    let start_day = if window.crosses_midnight() {
        date.pred_opt()?
    } else {
        date
    };
    let start = start_day.and_time(window.start_time.as_naive()).and_utc();
    let mut end = date.and_time(window.end_time.as_naive()).and_utc();
    if end <= start {
        end += Duration::days(1);
    }
    Some(Interval::new(start, end))
}

/// Every bookable start instant for `date`, sorted and de-duplicated.
///
/// `blocked` holds raw blocked intervals; each is widened by `buffer_minutes`
/// on both sides before the overlap test. No windows or no durations yields
/// an empty list.
pub fn compute_day_slots(
    date: NaiveDate,
    windows: &[Window],
    blocked: &[Interval],
    durations: &[u32],
    buffer_minutes: u32,
) -> Vec<DateTime<Utc>> {
    if windows.is_empty() || durations.is_empty() {
        return Vec::new();
    }
    let blocked = BlockedSet::new(blocked, buffer_minutes);
    day_slots(date, windows, &blocked, durations)
}

/// [`compute_day_slots`] over an already built [`BlockedSet`].
pub fn day_slots(
    date: NaiveDate,
    windows: &[Window],
    blocked: &BlockedSet,
    durations: &[u32],
) -> Vec<DateTime<Utc>> {
    let durations: Vec<Duration> = durations
        .iter()
        .filter(|d| **d > 0)
        .map(|d| Duration::minutes(i64::from(*d)))
        .collect();
    if durations.is_empty() {
        return Vec::new();
    }

    let mut slots = BTreeSet::new();
    for window in windows {
        let Some(bounds) = window_interval(date, window) else {
            continue;
        };
        let mut cursor = bounds.start;
        while cursor < bounds.end {
            let fits = durations.iter().any(|d| {
                let candidate = Interval::new(cursor, cursor + *d);
                candidate.end <= bounds.end && !blocked.overlaps(&candidate)
            });
            if fits {
                slots.insert(cursor);
            }
            cursor += stride();
        }
    }

    tracing::debug!(%date, windows = windows.len(), slots = slots.len(), "computed day slots");
    slots.into_iter().collect()
}

/// The earliest bookable start for a single duration, stopping at the first hit.
///
/// When a candidate collides with a blocked interval, every later candidate
/// that starts before that interval ends collides with it too, so the walk
/// jumps to the first stride position at or after the interval's end.
pub fn first_slot(
    date: NaiveDate,
    windows: &[Window],
    blocked: &BlockedSet,
    duration_minutes: u32,
) -> Option<DateTime<Utc>> {
    if duration_minutes == 0 {
        return None;
    }
    let duration = Duration::minutes(i64::from(duration_minutes));

    windows.iter().find_map(|window| {
        let bounds = window_interval(date, window)?;
        let mut cursor = bounds.start;
        while cursor < bounds.end {
            let candidate = Interval::new(cursor, cursor + duration);
            if candidate.end > bounds.end {
                return None;
            }
            match blocked.first_overlap(&candidate) {
                None => return Some(cursor),
                Some(block) => cursor = next_stride_at_or_after(bounds.start, block.end),
            }
        }
        None
    })
}

fn next_stride_at_or_after(origin: DateTime<Utc>, instant: DateTime<Utc>) -> DateTime<Utc> {
    let step = stride().num_seconds();
    let offset = (instant - origin).num_seconds().max(0);
    let steps = (offset + step - 1) / step;
    origin + Duration::seconds(steps * step)
}

/// Whether `slot` is a stride-aligned start that fits entirely in `window` on `date`.
pub fn fits_window(date: NaiveDate, window: &Window, slot: &Interval) -> bool {
    let Some(bounds) = window_interval(date, window) else {
        return false;
    };
    if slot.is_empty() || slot.start < bounds.start || slot.end > bounds.end {
        return false;
    }
    (slot.start - bounds.start).num_seconds() % stride().num_seconds() == 0
}

/// Re-run the slot rules for one requested interval instead of a whole day.
///
/// `dated_windows` lists every `(date, window)` pair that could contain the
/// slot; overnight spans mean that includes the neighbouring dates.
pub fn is_slot_bookable(
    dated_windows: &[(NaiveDate, Window)],
    blocked: &BlockedSet,
    slot: &Interval,
) -> bool {
    !blocked.overlaps(slot)
        && dated_windows
            .iter()
            .any(|(date, window)| fits_window(*date, window, slot))
}
