//! Rule resolution: which time-of-day windows apply to a calendar date.
//!
//! An override for the date always wins. An unavailable override, or one
//! without a complete window, resolves to no windows at all; weekly rules are
//! consulted only when the date has no override. Weekday and date matching is
//! done on the UTC calendar.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};

use crate::model::{AvailabilityOverride, AvailabilityRule, Schedule, Window};

/// A read-only snapshot of one schedule's rules and overrides.
#[derive(Debug, Clone)]
pub struct ScheduleSnapshot {
    pub schedule: Schedule,
    rules: Vec<AvailabilityRule>,
    overrides: HashMap<NaiveDate, AvailabilityOverride>,
}

impl ScheduleSnapshot {
    pub fn new(
        schedule: Schedule,
        rules: Vec<AvailabilityRule>,
        overrides: Vec<AvailabilityOverride>,
    ) -> Self {
        let overrides = overrides.into_iter().map(|o| (o.date, o)).collect();
        Self {
            schedule,
            rules,
            overrides,
        }
    }

    pub fn override_for(&self, date: NaiveDate) -> Option<&AvailabilityOverride> {
        self.overrides.get(&date)
    }

    /// The windows that apply to `date`, in rule order.
    pub fn windows_for(&self, date: NaiveDate) -> Vec<Window> {
        resolve_windows(&self.rules, self.override_for(date), date)
    }
}

/// Resolve the windows for `date` from weekly rules and an optional override.
pub fn resolve_windows(
    rules: &[AvailabilityRule],
    date_override: Option<&AvailabilityOverride>,
    date: NaiveDate,
) -> Vec<Window> {
    if let Some(o) = date_override {
        if o.is_unavailable {
            return Vec::new();
        }
        return match (o.start_time, o.end_time) {
            (Some(start_time), Some(end_time)) => vec![Window {
                start_time,
                end_time,
            }],
            _ => Vec::new(),
        };
    }

    let weekday = date.weekday().num_days_from_sunday();
    rules
        .iter()
        .filter(|r| u32::from(r.day_of_week) == weekday)
        .map(AvailabilityRule::window)
        .collect()
}
