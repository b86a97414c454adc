//! End-to-end tests of the engine facade over an in-memory store.

mod common;

use common::{at, date, engine, request};
use serde_json::json;
use slot_engine::{
    AvailabilityOverride, AvailabilityRule, BookingEngine, CalendarItem, Dataset, EngineError,
    Interval, TimeOfDay, Window,
};

fn t(h: u32, m: u32) -> TimeOfDay {
    TimeOfDay::new(h, m).unwrap()
}

/// Ana's recurring 09:00-09:30 standup on Mon/Wed, with the Wednesday
/// 2026-03-18 occurrence cancelled and the Monday 2026-03-23 one moved to
/// 13:00. Plus a lunch block on 2026-03-16 and a point reminder.
fn events() -> Dataset {
    serde_json::from_value(json!({
        "recurrence_rules": [{ "id": 5, "frequency": "WEEKLY", "by_day": "MO,WE" }],
        "events": [
            { "id": 100, "owner_id": "ana", "title": "Standup", "type": "blocked",
              "start_time": "2026-03-02T09:00:00Z", "end_time": "2026-03-02T09:30:00Z",
              "link": { "role": "template", "recurrence_id": 5 } },
            { "id": 101, "owner_id": "ana", "title": "Standup", "type": "blocked",
              "start_time": "2026-03-18T09:00:00Z", "end_time": "2026-03-18T09:30:00Z",
              "link": { "role": "exception", "parent_event_id": 100,
                        "original_start_time": "2026-03-18T09:00:00Z", "is_cancelled": true } },
            { "id": 102, "owner_id": "ana", "title": "Standup (moved)", "type": "blocked",
              "start_time": "2026-03-23T13:00:00Z", "end_time": "2026-03-23T13:30:00Z",
              "link": { "role": "exception", "parent_event_id": 100,
                        "original_start_time": "2026-03-23T09:00:00Z" } },
            { "id": 200, "owner_id": "ana", "title": "Lunch", "type": "personal",
              "start_time": "2026-03-16T12:00:00Z", "end_time": "2026-03-16T13:00:00Z" },
            { "id": 201, "owner_id": "ana", "title": "Reminder",
              "start_time": "2026-03-16T15:00:00Z" }
        ]
    }))
    .unwrap()
}

fn engine_with_events() -> BookingEngine {
    let mut engine = engine();
    engine.import(&events()).unwrap();
    engine
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

#[test]
fn import_reports_row_counts() {
    let mut engine = BookingEngine::in_memory().unwrap();
    let summary = engine.import(&common::dataset()).unwrap();
    assert_eq!(summary.schedules, 2);
    assert_eq!(summary.rules, 7);
    assert_eq!(summary.event_types, 3);

    let summary = engine.import(&events()).unwrap();
    assert_eq!(summary.recurrence_rules, 1);
    assert_eq!(summary.events, 5);
}

#[test]
fn failed_import_writes_nothing() {
    let mut engine = BookingEngine::in_memory().unwrap();
    let mut dataset = common::dataset();
    // Duplicate primary key on the second schedule.
    dataset.schedules[1].schedule.id = 1;
    assert!(matches!(engine.import(&dataset), Err(EngineError::Store(_))));
    assert!(engine.resolve_day(1, date(16)).unwrap_err().is_not_found());
}

#[test]
fn invalid_dataset_is_rejected() {
    let mut engine = BookingEngine::in_memory().unwrap();
    let mut dataset = common::dataset();
    dataset.event_types[0].default_duration = 45;
    assert!(matches!(engine.import(&dataset), Err(EngineError::Validation(_))));
}

// ---------------------------------------------------------------------------
// Read operations
// ---------------------------------------------------------------------------

#[test]
fn resolve_day_uses_stored_rules() {
    let engine = engine();
    assert_eq!(
        engine.resolve_day(1, date(16)).unwrap(),
        vec![Window {
            start_time: t(9, 0),
            end_time: t(17, 0)
        }]
    );
    assert!(engine.resolve_day(1, date(21)).unwrap().is_empty());
    assert!(engine.resolve_day(9, date(16)).unwrap_err().is_not_found());
}

#[test]
fn compute_day_slots_uses_caller_blocked_intervals() {
    let engine = engine();
    let blocked = [Interval::new(at(16, 10, 0), at(16, 10, 30))];
    let slots = engine.compute_day_slots(1, date(16), &[30], &blocked, 0).unwrap();
    assert_eq!(slots.len(), 28);
    assert!(!slots.contains(&at(16, 10, 0)));
}

#[test]
fn compute_month_availability_validates_month() {
    let engine = engine();
    let err = engine.compute_month_availability(1, "2026-3", &[], 30, 0).unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let days = engine.compute_month_availability(1, "2026-03", &[], 30, 0).unwrap();
    assert_eq!(days.len(), 22);
}

#[test]
fn manual_and_recurring_events_block_slots() {
    let engine = engine_with_events();
    let slots = engine.available_slots(10, date(16), Some(30)).unwrap();

    // Standup 09:00-09:30 and lunch 12:00-13:00.
    assert!(!slots.contains(&at(16, 9, 0)));
    assert!(slots.contains(&at(16, 9, 30)));
    assert!(!slots.contains(&at(16, 11, 45)));
    assert!(!slots.contains(&at(16, 12, 30)));
    assert!(slots.contains(&at(16, 13, 0)));
    // Point events never block.
    assert!(slots.contains(&at(16, 15, 0)));
}

#[test]
fn cancelled_occurrence_frees_its_time() {
    let engine = engine_with_events();
    let slots = engine.available_slots(10, date(18), None).unwrap();
    assert!(slots.contains(&at(18, 9, 0)));

    let slots = engine.available_slots(10, date(23), None).unwrap();
    assert!(slots.contains(&at(23, 9, 0)));
    assert!(!slots.contains(&at(23, 13, 0)));
}

#[test]
fn available_slots_rejects_unknown_duration() {
    let engine = engine();
    let err = engine.available_slots(10, date(16), Some(45)).unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[test]
fn month_availability_reads_blocked_time() {
    let mut engine = engine();
    // Fill Friday 2026-03-20 with hour-long bookings.
    for h in 9..17 {
        engine.commit_booking(&request(10, at(20, h, 0), 60)).unwrap();
    }
    let days = engine.month_availability(10, "2026-03").unwrap();
    assert!(days.contains(&19));
    assert!(!days.contains(&20));
    assert!(!days.contains(&21));
}

// ---------------------------------------------------------------------------
// Recurring events and the calendar
// ---------------------------------------------------------------------------

#[test]
fn expand_occurrences_applies_stored_exceptions() {
    let engine = engine_with_events();
    let out = engine
        .expand_occurrences("ana", at(16, 0, 0), at(23, 23, 59))
        .unwrap();

    let starts: Vec<_> = out.iter().map(|o| o.start_time).collect();
    assert_eq!(starts, vec![at(16, 9, 0), at(23, 13, 0)]);
    assert_eq!(out[1].title, "Standup (moved)");
    assert_eq!(out[1].exception_id, Some(102));
    assert_eq!(out[1].id.original_start, at(23, 9, 0));

    let again = engine
        .expand_occurrences("ana", at(16, 0, 0), at(23, 23, 59))
        .unwrap();
    assert_eq!(out, again);
}

#[test]
fn expand_occurrences_rejects_inverted_range() {
    let engine = engine_with_events();
    let err = engine.expand_occurrences("ana", at(20, 0, 0), at(16, 0, 0)).unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[test]
fn calendar_merges_events_and_occurrences() {
    let engine = engine_with_events();
    let items = engine
        .calendar("ana", &Interval::new(at(16, 0, 0), at(17, 0, 0)))
        .unwrap();

    let titles: Vec<_> = items.iter().map(CalendarItem::title).collect();
    assert_eq!(titles, vec!["Standup", "Lunch", "Reminder"]);
    assert!(matches!(items[0], CalendarItem::Occurrence(_)));
    assert!(matches!(items[1], CalendarItem::Event(_)));
    assert_eq!(items[2].end_time(), None);
}

#[test]
fn calendar_is_per_owner() {
    let engine = engine_with_events();
    let items = engine
        .calendar("bo", &Interval::new(at(16, 0, 0), at(17, 0, 0)))
        .unwrap();
    assert!(items.is_empty());
}

#[test]
fn occurrence_moved_from_an_earlier_week_blocks_its_new_time() {
    let mut engine = engine();
    // Daily 10:00-11:00; the 2026-03-10 occurrence now happens on 03-18 at 14:00.
    let planning: Dataset = serde_json::from_value(json!({
        "recurrence_rules": [{ "id": 8, "frequency": "DAILY" }],
        "events": [
            { "id": 400, "owner_id": "ana", "title": "Planning", "type": "blocked",
              "start_time": "2026-03-02T10:00:00Z", "end_time": "2026-03-02T11:00:00Z",
              "link": { "role": "template", "recurrence_id": 8 } },
            { "id": 401, "owner_id": "ana", "title": "Planning (moved)", "type": "blocked",
              "start_time": "2026-03-18T14:00:00Z", "end_time": "2026-03-18T15:00:00Z",
              "link": { "role": "exception", "parent_event_id": 400,
                        "original_start_time": "2026-03-10T10:00:00Z" } }
        ]
    }))
    .unwrap();
    engine.import(&planning).unwrap();

    let slots = engine.available_slots(10, date(18), Some(30)).unwrap();
    assert!(!slots.contains(&at(18, 10, 0)));
    assert!(slots.contains(&at(18, 11, 0)));
    assert!(slots.contains(&at(18, 13, 30)));
    assert!(!slots.contains(&at(18, 14, 0)));
    assert!(!slots.contains(&at(18, 14, 30)));
    assert!(slots.contains(&at(18, 15, 0)));

    let err = engine.commit_booking(&request(10, at(18, 14, 0), 30)).unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err:?}");

    let items = engine
        .calendar("ana", &Interval::new(at(18, 9, 0), at(18, 17, 0)))
        .unwrap();
    let titles: Vec<_> = items.iter().map(CalendarItem::title).collect();
    assert_eq!(titles, vec!["Planning", "Planning (moved)"]);
}

// ---------------------------------------------------------------------------
// Schedule maintenance
// ---------------------------------------------------------------------------

#[test]
fn replace_rules_changes_windows() {
    let mut engine = engine();
    engine
        .replace_rules(
            "ana",
            1,
            &[AvailabilityRule {
                day_of_week: 6,
                start_time: t(10, 0),
                end_time: t(12, 0),
            }],
        )
        .unwrap();
    assert!(engine.resolve_day(1, date(16)).unwrap().is_empty());
    assert_eq!(engine.resolve_day(1, date(21)).unwrap().len(), 1);
}

#[test]
fn replace_rules_checks_owner_and_input() {
    let mut engine = engine();
    let rule = AvailabilityRule {
        day_of_week: 1,
        start_time: t(10, 0),
        end_time: t(12, 0),
    };
    assert!(engine.replace_rules("bo", 1, &[rule.clone()]).unwrap_err().is_not_found());
    assert!(engine.replace_rules("ana", 42, &[rule.clone()]).unwrap_err().is_not_found());

    let bad = AvailabilityRule {
        day_of_week: 9,
        ..rule
    };
    assert!(matches!(
        engine.replace_rules("ana", 1, &[bad]).unwrap_err(),
        EngineError::Validation(_)
    ));
    // Nothing changed.
    assert_eq!(engine.resolve_day(1, date(16)).unwrap().len(), 1);
}

#[test]
fn set_override_upserts_by_date() {
    let mut engine = engine();
    engine
        .set_override("ana", &AvailabilityOverride::unavailable(1, date(16)))
        .unwrap();
    assert!(engine.available_slots(10, date(16), None).unwrap().is_empty());

    engine
        .set_override(
            "ana",
            &AvailabilityOverride::window(1, date(16), t(14, 0), t(15, 0)),
        )
        .unwrap();
    let slots = engine.available_slots(10, date(16), None).unwrap();
    assert_eq!(slots, vec![at(16, 14, 0), at(16, 14, 15), at(16, 14, 30)]);

    engine.clear_override("ana", 1, date(16)).unwrap();
    assert_eq!(engine.available_slots(10, date(16), None).unwrap().len(), 31);
    assert!(engine.clear_override("ana", 1, date(16)).unwrap_err().is_not_found());
}

#[test]
fn set_override_rejects_incomplete_window_and_foreign_schedule() {
    let mut engine = engine();
    let incomplete = AvailabilityOverride {
        schedule_id: 1,
        date: date(16),
        is_unavailable: false,
        start_time: Some(t(9, 0)),
        end_time: None,
    };
    assert!(matches!(
        engine.set_override("ana", &incomplete).unwrap_err(),
        EngineError::Validation(_)
    ));
    assert!(engine
        .set_override("ana", &AvailabilityOverride::unavailable(2, date(16)))
        .unwrap_err()
        .is_not_found());
}
