//! Bulk import of schedules, event types and manual events from JSON.
//!
//! ```json
//! {
//!   "schedules": [
//!     { "id": 1, "owner_id": "ana", "name": "Work week",
//!       "rules": [{ "day_of_week": 1, "start_time": "09:00", "end_time": "17:00" }],
//!       "overrides": [{ "schedule_id": 1, "date": "2026-03-09", "is_unavailable": true }] }
//!   ],
//!   "event_types": [
//!     { "id": 10, "owner_id": "ana", "schedule_id": 1, "title": "Intro call",
//!       "durations": [30, 60], "default_duration": 30, "buffer_time": 0 }
//!   ],
//!   "recurrence_rules": [{ "id": 5, "frequency": "WEEKLY", "by_day": "MO,WE" }],
//!   "events": [
//!     { "id": 100, "owner_id": "ana", "title": "Standup",
//!       "start_time": "2026-03-02T09:00:00Z", "end_time": "2026-03-02T09:15:00Z",
//!       "link": { "role": "template", "recurrence_id": 5 } }
//!   ]
//! }
//! ```

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::model::{
    AvailabilityOverride, AvailabilityRule, EventLink, EventType, ManualEvent, RecurrenceRule,
    Schedule,
};
use crate::store;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub schedules: Vec<ScheduleRecord>,
    #[serde(default)]
    pub event_types: Vec<EventType>,
    #[serde(default)]
    pub recurrence_rules: Vec<RecurrenceRule>,
    #[serde(default)]
    pub events: Vec<ManualEvent>,
}

/// A schedule together with its weekly rules and per-date overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    #[serde(flatten)]
    pub schedule: Schedule,
    #[serde(default)]
    pub rules: Vec<AvailabilityRule>,
    #[serde(default)]
    pub overrides: Vec<AvailabilityOverride>,
}

/// Row counts written by an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub schedules: usize,
    pub rules: usize,
    pub overrides: usize,
    pub event_types: usize,
    pub recurrence_rules: usize,
    pub events: usize,
}

impl Dataset {
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Check every record before anything is written.
    pub fn validate(&self) -> Result<()> {
        for record in &self.schedules {
            for rule in &record.rules {
                rule.validate()?;
            }
            for o in &record.overrides {
                if o.schedule_id != record.schedule.id {
                    return Err(EngineError::Validation(format!(
                        "override for {} names schedule {} but is listed under schedule {}",
                        o.date, o.schedule_id, record.schedule.id
                    )));
                }
                o.validate()?;
            }
        }
        for event_type in &self.event_types {
            event_type.validate()?;
        }
        for event in &self.events {
            if let EventLink::Derived { .. } = event.link {
                return Err(EngineError::Validation(format!(
                    "event {} is derived from a booking and cannot be imported",
                    event.id
                )));
            }
            if let Some(end) = event.end_time {
                if end < event.start_time {
                    return Err(EngineError::Validation(format!(
                        "event {} ends before it starts",
                        event.id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Write `dataset` through `conn`. The caller owns the transaction.
pub(crate) fn import_into(conn: &Connection, dataset: &Dataset) -> Result<ImportSummary> {
    dataset.validate()?;
    let mut summary = ImportSummary::default();

    for record in &dataset.schedules {
        store::insert_schedule(conn, &record.schedule)?;
        store::replace_rules(conn, record.schedule.id, &record.rules)?;
        for o in &record.overrides {
            store::upsert_override(conn, o)?;
        }
        summary.schedules += 1;
        summary.rules += record.rules.len();
        summary.overrides += record.overrides.len();
    }

    for event_type in &dataset.event_types {
        store::insert_event_type(conn, event_type)?;
        summary.event_types += 1;
    }

    for rule in &dataset.recurrence_rules {
        store::insert_recurrence_rule(conn, rule)?;
        summary.recurrence_rules += 1;
    }

    // Exceptions reference their template row, so they go in last.
    let (exceptions, others): (Vec<&ManualEvent>, Vec<&ManualEvent>) = dataset
        .events
        .iter()
        .partition(|e| matches!(e.link, EventLink::Exception { .. }));
    for event in others.into_iter().chain(exceptions) {
        store::insert_event(conn, Some(event.id), event)?;
        summary.events += 1;
    }

    Ok(summary)
}
