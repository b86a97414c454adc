//! Recurrence expansion with per-occurrence exceptions.
//!
//! A template event plus its [`RecurrenceRule`](crate::model::RecurrenceRule)
//! is turned into an RFC 5545 recurrence set (via the `rrule` crate) and
//! enumerated inside a caller window. Each occurrence is then resolved against the exception rows keyed
//! by `(template_id, original_start)`:
//!
//! - no exception: the template's own span is shifted onto the occurrence start
//! - a modifying exception: the exception row's fields replace the template's
//! - a cancelling exception: the occurrence disappears
//!
//! A template whose rule cannot be interpreted is logged and skipped; it never
//! aborts the expansion of the other templates.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use rrule::RRuleSet;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::interval::Interval;
use crate::model::{EventKind, EventLink, ManualEvent, RecurringTemplate};

// ── Rule interpretation ─────────────────────────────────────────────────────

/// Supported recurrence frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    Yearly,
    Monthly,
    Weekly,
    Daily,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Yearly => "YEARLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Daily => "DAILY",
        }
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "YEARLY" => Ok(Frequency::Yearly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "WEEKLY" => Ok(Frequency::Weekly),
            "DAILY" => Ok(Frequency::Daily),
            other => Err(format!("unsupported frequency '{other}'")),
        }
    }
}

const WEEKDAY_TOKENS: [&str; 7] = ["SU", "MO", "TU", "WE", "TH", "FR", "SA"];

/// Parse a comma-joined `by_day` list into normalized two-letter tokens.
///
/// An empty or blank list means "no weekday restriction". Any unknown or
/// empty token rejects the whole list.
pub fn parse_by_day(raw: &str) -> std::result::Result<Vec<&'static str>, String> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut days: Vec<&'static str> = Vec::new();
    for token in raw.split(',') {
        let upper = token.trim().to_ascii_uppercase();
        let day = WEEKDAY_TOKENS
            .iter()
            .copied()
            .find(|t| *t == upper)
            .ok_or_else(|| format!("malformed by_day token '{}'", token.trim()))?;
        if !days.contains(&day) {
            days.push(day);
        }
    }
    Ok(days)
}

fn ical_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Build the recurrence set for a template.
///
/// # Errors
///
/// Returns [`EngineError::UnsupportedRecurrence`] for an unknown frequency, a
/// zero interval, a malformed `by_day` list, or a rule the `rrule` crate rejects.
fn build_rrule_set(template: &RecurringTemplate) -> Result<RRuleSet> {
    let template_id = template.event.id;
    let unsupported = |reason: String| EngineError::UnsupportedRecurrence {
        template_id,
        reason,
    };
    let rule = &template.rule;

    let frequency: Frequency = rule.frequency.parse().map_err(unsupported)?;
    if rule.interval == 0 {
        return Err(unsupported("interval must be at least 1".to_string()));
    }

    let mut rrule = format!("FREQ={};INTERVAL={}", frequency.as_str(), rule.interval);
    if frequency == Frequency::Weekly {
        let days = parse_by_day(rule.by_day.as_deref().unwrap_or_default()).map_err(unsupported)?;
        if !days.is_empty() {
            rrule.push_str(";BYDAY=");
            rrule.push_str(&days.join(","));
        }
    }
    if let Some(end_date) = rule.end_date {
        // The end date is inclusive: anything starting on that UTC day counts.
        let until = end_date.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN));
        rrule.push_str(";UNTIL=");
        rrule.push_str(&ical_utc(until.and_utc()));
    }

    let text = format!("DTSTART:{}\nRRULE:{}", ical_utc(template.event.start_time), rrule);
    text.parse::<RRuleSet>()
        .map_err(|e| unsupported(format!("{e}")))
}

/// Occurrence start instants of `template` within `[range_start, range_end]`
/// (both bounds inclusive), capped at `max_occurrences`.
///
/// # Errors
///
/// Returns [`EngineError::UnsupportedRecurrence`] if the rule cannot be interpreted.
pub fn occurrence_starts(
    template: &RecurringTemplate,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    max_occurrences: u16,
) -> Result<Vec<DateTime<Utc>>> {
    if range_end < range_start || max_occurrences == 0 {
        return Ok(Vec::new());
    }
    if let Some(end_date) = template.rule.end_date {
        if end_date < template.event.start_time.date_naive() {
            return Ok(Vec::new());
        }
    }

    let rrule_set = build_rrule_set(template)?;

    // Pad by a second on each side so the result does not depend on whether the
    // rrule bounds are inclusive; the exact inclusive filter is applied below.
    let pad = Duration::seconds(1);
    let after = (range_start - pad).with_timezone(&rrule::Tz::UTC);
    let before = (range_end + pad).with_timezone(&rrule::Tz::UTC);
    let result = rrule_set.after(after).before(before).all(max_occurrences);

    if result.limited {
        tracing::warn!(
            template_id = template.event.id,
            max_occurrences,
            "recurrence expansion hit the per-template cap"
        );
    }

    Ok(result
        .dates
        .into_iter()
        .map(|dt| dt.with_timezone(&Utc))
        .filter(|start| *start >= range_start && *start <= range_end)
        .collect())
}

// ── Occurrences ─────────────────────────────────────────────────────────────

/// Identity of one occurrence: the template plus the instant the rule placed it at.
///
/// Stable across re-expansions, so a caller can target a single occurrence for
/// an edit or a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OccurrenceId {
    pub template_id: i64,
    pub original_start: DateTime<Utc>,
}

impl fmt::Display for OccurrenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.template_id, self.original_start.to_rfc3339())
    }
}

/// One occurrence after exception lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Occurrence<'a> {
    /// Built from the template itself.
    Synthesized {
        template: &'a RecurringTemplate,
        start: DateTime<Utc>,
    },
    /// Replaced by an exception row.
    Overridden {
        id: OccurrenceId,
        exception: &'a ManualEvent,
    },
    /// Removed by a cancelling exception.
    Cancelled { id: OccurrenceId },
}

impl Occurrence<'_> {
    pub fn id(&self) -> OccurrenceId {
        match self {
            Occurrence::Synthesized { template, start } => OccurrenceId {
                template_id: template.event.id,
                original_start: *start,
            },
            Occurrence::Overridden { id, .. } | Occurrence::Cancelled { id } => *id,
        }
    }

    /// The concrete record for a live occurrence; `None` when cancelled.
    pub fn to_expanded(&self) -> Option<ExpandedOccurrence> {
        let id = self.id();
        match self {
            Occurrence::Synthesized { template, start } => {
                let event = &template.event;
                let end_time = event.end_time.map(|end| *start + (end - event.start_time));
                Some(ExpandedOccurrence {
                    id,
                    exception_id: None,
                    owner_id: event.owner_id.clone(),
                    title: event.title.clone(),
                    description: event.description.clone(),
                    kind: event.kind,
                    start_time: *start,
                    end_time,
                    guests: event.guests.clone(),
                })
            }
            Occurrence::Overridden { exception, .. } => Some(ExpandedOccurrence {
                id,
                exception_id: Some(exception.id),
                owner_id: exception.owner_id.clone(),
                title: exception.title.clone(),
                description: exception.description.clone(),
                kind: exception.kind,
                start_time: exception.start_time,
                end_time: exception.end_time,
                guests: exception.guests.clone(),
            }),
            Occurrence::Cancelled { .. } => None,
        }
    }
}

/// A concrete, merge-ready occurrence of a recurring event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandedOccurrence {
    pub id: OccurrenceId,
    /// Row id of the exception that replaced this occurrence, if any.
    pub exception_id: Option<i64>,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub guests: Vec<String>,
}

impl ExpandedOccurrence {
    pub fn interval(&self) -> Option<Interval> {
        self.end_time
            .map(|end| Interval::new(self.start_time, end))
            .filter(|i| !i.is_empty())
    }

    /// Whether this occurrence shows up in `range`: a span must overlap it, a
    /// point must lie inside it.
    pub fn is_visible_in(&self, range: &Interval) -> bool {
        match self.interval() {
            Some(span) => span.overlaps(range),
            None => self.start_time >= range.start && self.start_time < range.end,
        }
    }
}

type ExceptionKey = (i64, DateTime<Utc>);

fn index_exceptions(exceptions: &[ManualEvent]) -> HashMap<ExceptionKey, &ManualEvent> {
    exceptions
        .iter()
        .filter_map(|e| match &e.link {
            EventLink::Exception {
                parent_event_id,
                original_start_time,
                ..
            } => Some(((*parent_event_id, *original_start_time), e)),
            _ => None,
        })
        .collect()
}

/// Resolve every occurrence in `[range_start, range_end]`, cancelled ones included.
pub fn resolve_occurrences<'a>(
    templates: &'a [RecurringTemplate],
    exceptions: &'a [ManualEvent],
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    max_per_template: u16,
) -> Vec<Occurrence<'a>> {
    let by_key = index_exceptions(exceptions);
    let mut occurrences = Vec::new();

    for template in templates {
        let starts = match occurrence_starts(template, range_start, range_end, max_per_template) {
            Ok(starts) => starts,
            Err(err) => {
                tracing::warn!(template_id = template.event.id, error = %err, "skipping recurrence template");
                continue;
            }
        };

        occurrences.extend(starts.into_iter().map(|start| classify(template, &by_key, start)));
    }
    occurrences
}

fn classify<'a>(
    template: &'a RecurringTemplate,
    by_key: &HashMap<ExceptionKey, &'a ManualEvent>,
    start: DateTime<Utc>,
) -> Occurrence<'a> {
    let id = OccurrenceId {
        template_id: template.event.id,
        original_start: start,
    };
    match by_key.get(&(id.template_id, start)).copied() {
        Some(exception) if is_cancelling(exception) => Occurrence::Cancelled { id },
        Some(exception) => Occurrence::Overridden { id, exception },
        None => Occurrence::Synthesized { template, start },
    }
}

fn is_cancelling(event: &ManualEvent) -> bool {
    matches!(event.link, EventLink::Exception { is_cancelled: true, .. })
}

/// Expand every template into live occurrences within `[range_start, range_end]`.
///
/// Output is sorted by start time, then by occurrence identity.
pub fn expand_occurrences(
    templates: &[RecurringTemplate],
    exceptions: &[ManualEvent],
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    max_per_template: u16,
) -> Vec<ExpandedOccurrence> {
    let mut expanded: Vec<ExpandedOccurrence> =
        resolve_occurrences(templates, exceptions, range_start, range_end, max_per_template)
            .iter()
            .filter_map(Occurrence::to_expanded)
            .collect();
    expanded.sort_by_key(|o| (o.start_time, o.id));

    tracing::debug!(
        templates = templates.len(),
        occurrences = expanded.len(),
        "expanded recurring events"
    );
    expanded
}

/// The earliest original start an occurrence of `templates` can have and still
/// reach into `range`: each template looks back by its own span.
pub fn earliest_reaching_start(templates: &[RecurringTemplate], range: &Interval) -> DateTime<Utc> {
    templates
        .iter()
        .map(|t| range.start - t.span())
        .min()
        .unwrap_or(range.start)
}

/// Every live occurrence whose own time is visible in `range`.
///
/// Unlike [`expand_occurrences`], which selects by original start, this
/// selects by where the occurrence actually sits: a long occurrence that began
/// before `range` is kept, and so is a modifying exception moved into `range`
/// from an original start far outside it. `exceptions` must hold every
/// exception whose original start is at or after
/// [`earliest_reaching_start`], plus every exception row visible in `range`.
///
/// Output is sorted by start time, then by occurrence identity.
pub fn occurrences_overlapping(
    templates: &[RecurringTemplate],
    exceptions: &[ManualEvent],
    range: &Interval,
    max_per_template: u16,
) -> Vec<ExpandedOccurrence> {
    let by_key = index_exceptions(exceptions);
    let mut seen: HashSet<OccurrenceId> = HashSet::new();
    let mut live = Vec::new();

    for template in templates {
        let from = range.start - template.span();
        let starts = match occurrence_starts(template, from, range.end, max_per_template) {
            Ok(starts) => starts,
            Err(err) => {
                tracing::warn!(template_id = template.event.id, error = %err, "skipping recurrence template");
                continue;
            }
        };
        for start in starts {
            let occurrence = classify(template, &by_key, start);
            seen.insert(occurrence.id());
            live.extend(occurrence.to_expanded());
        }
    }

    // Modified occurrences whose original start fell outside every template's
    // window but which were moved into the range.
    for (&(template_id, original_start), &exception) in &by_key {
        let id = OccurrenceId {
            template_id,
            original_start,
        };
        if is_cancelling(exception) || seen.contains(&id) {
            continue;
        }
        live.extend(Occurrence::Overridden { id, exception }.to_expanded());
    }

    live.retain(|o| o.is_visible_in(range));
    live.sort_by_key(|o| (o.start_time, o.id));
    live
}
