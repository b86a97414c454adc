//! Half-open time intervals and the buffered blocked-time index.
//!
//! Every interval in the engine is `[start, end)`: an interval that ends exactly
//! when another starts does NOT overlap it. Blocked time is widened by the
//! event type's buffer on both sides, then sorted and merged into a
//! [`BlockedSet`] so that overlap queries are a binary search instead of a scan.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A half-open interval `[start, end)` between two absolute instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Interval of `minutes` length starting at `start`.
    pub fn starting_at(start: DateTime<Utc>, minutes: u32) -> Self {
        Self {
            start,
            end: start + Duration::minutes(i64::from(minutes)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Two intervals overlap iff `a.start < b.end && b.start < a.end`.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Widen symmetrically by `minutes` on both ends.
    pub fn widen(&self, minutes: u32) -> Interval {
        let pad = Duration::minutes(i64::from(minutes));
        Interval {
            start: self.start - pad,
            end: self.end + pad,
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Sort and merge overlapping or adjacent intervals.
///
/// Empty intervals are dropped. Adjacent intervals are merged because, for
/// half-open overlap tests, `[a, b) ∪ [b, c)` blocks exactly what `[a, c)` blocks.
pub fn merge_intervals(intervals: impl IntoIterator<Item = Interval>) -> Vec<Interval> {
    let mut sorted: Vec<Interval> = intervals.into_iter().filter(|i| !i.is_empty()).collect();
    if sorted.is_empty() {
        return sorted;
    }
    sorted.sort();

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        if let Some(last) = merged.last_mut() {
            if interval.start <= last.end {
                last.end = last.end.max(interval.end);
                continue;
            }
        }
        merged.push(interval);
    }
    merged
}

/// Blocked time after buffer widening, merged and sorted for binary search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockedSet {
    merged: Vec<Interval>,
}

impl BlockedSet {
    /// Build the set from raw blocked intervals and a buffer in minutes.
    pub fn new(blocked: &[Interval], buffer_minutes: u32) -> Self {
        Self {
            merged: merge_intervals(blocked.iter().map(|b| b.widen(buffer_minutes))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }

    /// The merged, widened intervals in chronological order.
    pub fn intervals(&self) -> &[Interval] {
        &self.merged
    }

    /// The first merged interval that overlaps `candidate`, if any.
    pub fn first_overlap(&self, candidate: &Interval) -> Option<&Interval> {
        // Merged intervals are disjoint and sorted, so their ends are sorted too.
        let idx = self.merged.partition_point(|b| b.end <= candidate.start);
        self.merged
            .get(idx)
            .filter(|b| b.start < candidate.end)
    }

    pub fn overlaps(&self, candidate: &Interval) -> bool {
        self.first_overlap(candidate).is_some()
    }
}
