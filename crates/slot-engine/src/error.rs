//! Error types for slot-engine operations.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// A referenced schedule, event type, booking or event does not exist,
    /// or does not belong to the requesting owner.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Input rejected before any computation ran.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested interval is no longer bookable.
    #[error("Interval {start} - {end} is no longer available")]
    Conflict {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// A recurrence template whose rule cannot be interpreted.
    #[error("Unsupported recurrence on template {template_id}: {reason}")]
    UnsupportedRecurrence { template_id: i64, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
