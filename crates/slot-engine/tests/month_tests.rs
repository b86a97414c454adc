//! Tests for the month scanner and `YearMonth` parsing.

use chrono::{NaiveDate, TimeZone, Utc};
use slot_engine::interval::{BlockedSet, Interval};
use slot_engine::model::{AvailabilityOverride, AvailabilityRule, Schedule, TimeOfDay};
use slot_engine::month::{compute_month_availability, YearMonth};
use slot_engine::resolver::ScheduleSnapshot;
use slot_engine::slots::day_slots;
use slot_engine::EngineError;

fn t(h: u32, m: u32) -> TimeOfDay {
    TimeOfDay::new(h, m).unwrap()
}

fn weekdays(start: TimeOfDay, end: TimeOfDay) -> Vec<AvailabilityRule> {
    (1..=5)
        .map(|day_of_week| AvailabilityRule {
            day_of_week,
            start_time: start,
            end_time: end,
        })
        .collect()
}

fn snapshot(rules: Vec<AvailabilityRule>, overrides: Vec<AvailabilityOverride>) -> ScheduleSnapshot {
    ScheduleSnapshot::new(
        Schedule {
            id: 1,
            owner_id: "ana".to_string(),
            name: "Work week".to_string(),
        },
        rules,
        overrides,
    )
}

fn march() -> YearMonth {
    "2026-03".parse().unwrap()
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
}

// ---------------------------------------------------------------------------
// YearMonth
// ---------------------------------------------------------------------------

#[test]
fn year_month_parses_and_displays() {
    let ym: YearMonth = "2026-03".parse().unwrap();
    assert_eq!((ym.year(), ym.month()), (2026, 3));
    assert_eq!(ym.to_string(), "2026-03");
    assert_eq!(ym.days().count(), 31);
}

#[test]
fn malformed_months_are_validation_errors() {
    for raw in ["2026-3", "2026/03", "2026-13", "26-03", "", "march"] {
        let err = raw.parse::<YearMonth>().unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)), "{raw} gave {err:?}");
    }
}

#[test]
fn february_length_follows_leap_years() {
    assert_eq!("2028-02".parse::<YearMonth>().unwrap().days().count(), 29);
    assert_eq!("2026-02".parse::<YearMonth>().unwrap().days().count(), 28);
}

#[test]
fn blocked_range_has_a_day_of_slack() {
    let range = "2026-12".parse::<YearMonth>().unwrap().blocked_range();
    assert_eq!(range.start, Utc.with_ymd_and_hms(2026, 11, 30, 0, 0, 0).unwrap());
    assert_eq!(range.end, Utc.with_ymd_and_hms(2027, 1, 2, 0, 0, 0).unwrap());
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

#[test]
fn weekdays_are_available_minus_overrides_and_full_blocks() {
    let snap = snapshot(
        weekdays(t(9, 0), t(17, 0)),
        vec![AvailabilityOverride::unavailable(1, date(16))],
    );
    let blocked = [Interval::new(
        Utc.with_ymd_and_hms(2026, 3, 17, 9, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 3, 17, 17, 0, 0).unwrap(),
    )];

    let days = compute_month_availability(&snap, march(), &blocked, 30, 0);
    assert_eq!(
        days,
        vec![2, 3, 4, 5, 6, 9, 10, 11, 12, 13, 18, 19, 20, 23, 24, 25, 26, 27, 30, 31]
    );
}

#[test]
fn override_opens_a_weekend_day() {
    let snap = snapshot(
        weekdays(t(9, 0), t(17, 0)),
        vec![AvailabilityOverride::window(1, date(21), t(10, 0), t(11, 0))],
    );
    let days = compute_month_availability(&snap, march(), &[], 60, 0);
    assert!(days.contains(&21));
    assert!(!days.contains(&22));
}

#[test]
fn buffer_can_make_a_day_unavailable() {
    // A 30-minute window with a booking right after it: free without a buffer,
    // blocked once a 15-minute buffer is applied.
    let snap = snapshot(vec![], vec![AvailabilityOverride::window(1, date(10), t(9, 0), t(9, 30))]);
    let blocked = [Interval::new(
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 30, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap(),
    )];
    assert_eq!(compute_month_availability(&snap, march(), &blocked, 30, 0), vec![10]);
    assert!(compute_month_availability(&snap, march(), &blocked, 30, 15).is_empty());
}

#[test]
fn overnight_window_on_the_first_uses_the_previous_month() {
    // Sunday 2026-03-01 gets 22:00-02:00, which opens on 2026-02-28.
    let snap = snapshot(
        vec![AvailabilityRule {
            day_of_week: 0,
            start_time: t(22, 0),
            end_time: t(2, 0),
        }],
        vec![],
    );
    let blocked = [Interval::new(
        Utc.with_ymd_and_hms(2026, 2, 28, 22, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 3, 1, 1, 30, 0).unwrap(),
    )];
    let days = compute_month_availability(&snap, march(), &blocked, 30, 0);
    assert_eq!(days.first(), Some(&1));

    let blocked = [Interval::new(
        Utc.with_ymd_and_hms(2026, 2, 28, 22, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap(),
    )];
    let days = compute_month_availability(&snap, march(), &blocked, 30, 0);
    assert_eq!(days.first(), Some(&8));
}

#[test]
fn scanner_agrees_with_full_enumeration() {
    let snap = snapshot(
        weekdays(t(9, 0), t(12, 0)),
        vec![AvailabilityOverride::window(1, date(7), t(22, 0), t(1, 0))],
    );
    let blocked = vec![
        Interval::new(
            Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 3, 11, 40, 0).unwrap(),
        ),
        Interval::new(
            Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 4, 11, 0, 0).unwrap(),
        ),
    ];
    let set = BlockedSet::new(&blocked, 10);

    let scanned = compute_month_availability(&snap, march(), &blocked, 45, 10);
    let enumerated: Vec<u32> = march()
        .days()
        .filter(|d| !day_slots(*d, &snap.windows_for(*d), &set, &[45]).is_empty())
        .map(|d| chrono::Datelike::day(&d))
        .collect();

    assert_eq!(scanned, enumerated);
    assert!(!scanned.contains(&3));
    assert!(scanned.contains(&4));
    assert!(scanned.contains(&7));
}
