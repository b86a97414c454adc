//! # slot-engine
//!
//! Availability resolution, recurrence expansion and double-booking-safe
//! commits for booking pages.
//!
//! An owner publishes weekly availability rules and per-date overrides; third
//! parties pick a start time for one of the owner's event types. The engine
//! answers which starts are bookable on a date, which days of a month have
//! any, and commits a chosen slot only if it is still free at commit time.
//! All rule matching happens on the UTC calendar with UTC wall-clock times.
//!
//! ## Modules
//!
//! - [`interval`]: half-open intervals and the buffered blocked-time index
//! - [`model`]: rules, overrides, event types, bookings, manual events
//! - [`resolver`]: which windows apply to a date
//! - [`slots`]: bookable start instants for one date
//! - [`month`]: days of a month with at least one bookable start
//! - [`recurrence`]: recurring events expanded with per-occurrence exceptions
//! - [`blocked`]: the time an owner cannot be booked
//! - [`booking`]: the transactional commit guard
//! - [`store`]: SQLite persistence
//! - [`dataset`]: JSON bulk import
//! - [`config`]: TOML configuration
//! - [`engine`]: the [`BookingEngine`] facade
//! - [`error`]: error types

pub mod blocked;
pub mod booking;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod interval;
pub mod model;
pub mod month;
pub mod recurrence;
pub mod resolver;
pub mod slots;
pub mod store;

pub use booking::BookingRequest;
pub use config::EngineConfig;
pub use dataset::{Dataset, ImportSummary, ScheduleRecord};
pub use engine::{BookingEngine, CalendarItem};
pub use error::{EngineError, Result};
pub use interval::{BlockedSet, Interval};
pub use model::{
    AvailabilityOverride, AvailabilityRule, BookerInfo, Booking, BookingRef, EventKind, EventLink,
    EventType, ManualEvent, RecurrenceRule, RecurringTemplate, Schedule, TimeOfDay, Window,
};
pub use month::YearMonth;
pub use recurrence::{expand_occurrences, ExpandedOccurrence, Occurrence, OccurrenceId};
pub use resolver::{resolve_windows, ScheduleSnapshot};
pub use slots::{compute_day_slots, SLOT_STRIDE_MINUTES};
