//! Shared fixture: one owner with a work-week schedule and three event types.
//!
//! Week of 2026-03-16 (Monday):
//! - schedule 1 (ana): Mon-Fri 09:00-17:00, Wednesday also 22:00-06:00
//!   (i.e. Tuesday night into Wednesday morning)
//! - event type 10: durations [30, 60], no buffer
//! - event type 11: durations [30], 15 minute buffer
//! - event type 20: owned by bo on schedule 2 (Mondays 09:00-10:00)

#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::json;
use slot_engine::{BookerInfo, BookingEngine, BookingRequest, Dataset};

pub fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, h, m, 0).unwrap()
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
}

pub fn dataset() -> Dataset {
    let workday = |day: u8| json!({ "day_of_week": day, "start_time": "09:00", "end_time": "17:00" });
    let value = json!({
        "schedules": [
            {
                "id": 1, "owner_id": "ana", "name": "Work week",
                "rules": [
                    workday(1), workday(2), workday(3), workday(4), workday(5),
                    { "day_of_week": 3, "start_time": "22:00", "end_time": "06:00" }
                ]
            },
            {
                "id": 2, "owner_id": "bo", "name": "Mondays",
                "rules": [{ "day_of_week": 1, "start_time": "09:00", "end_time": "10:00" }]
            }
        ],
        "event_types": [
            { "id": 10, "owner_id": "ana", "schedule_id": 1, "title": "Intro call",
              "durations": [30, 60], "default_duration": 30, "buffer_time": 0 },
            { "id": 11, "owner_id": "ana", "schedule_id": 1, "title": "Review",
              "durations": [30], "default_duration": 30, "buffer_time": 15 },
            { "id": 20, "owner_id": "bo", "schedule_id": 2, "title": "Office hours",
              "durations": [30], "default_duration": 30 }
        ]
    });
    serde_json::from_value(value).unwrap()
}

pub fn engine() -> BookingEngine {
    let mut engine = BookingEngine::in_memory().unwrap();
    engine.import(&dataset()).unwrap();
    engine
}

pub fn request(event_type_id: i64, start: DateTime<Utc>, minutes: u32) -> BookingRequest {
    BookingRequest {
        event_type_id,
        start,
        duration_minutes: minutes,
        booker: BookerInfo {
            name: "Cleo".to_string(),
            email: "cleo@example.com".to_string(),
            notes: None,
        },
    }
}
