//! Error types for series operations.

use recurrence_engine::RecurrenceError;
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// One event that a cascading series operation could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFailure {
    pub event_slug: String,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum SeriesError {
    /// Malformed recurrence rule, bad timezone, or a missing/ambiguous template.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The event already belongs to another series, or the slot is taken.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Some events of a cascading delete/detach failed; the series row was kept.
    #[error(
        "series {series_slug}: {} event(s) failed, {succeeded} processed",
        .failures.len()
    )]
    PartialFailure {
        series_slug: String,
        succeeded: usize,
        failures: Vec<EventFailure>,
    },

    #[error(transparent)]
    Store(StoreError),
}

impl From<RecurrenceError> for SeriesError {
    fn from(err: RecurrenceError) -> Self {
        SeriesError::Validation(err.to_string())
    }
}

impl From<StoreError> for SeriesError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => SeriesError::NotFound(msg),
            StoreError::Conflict(msg) => SeriesError::Conflict(msg),
            other => SeriesError::Store(other),
        }
    }
}

pub type SeriesResult<T> = std::result::Result<T, SeriesError>;
