//! Error types for scheduling and persistence.

use chrono::NaiveDate;
use shed_id::{JobId, RunId};
use thiserror::Error;

/// Result type for scheduler operations.
pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// A raw date that no matcher could place in the week.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DateError {
    #[error("unparseable date: {0:?}")]
    Unparseable(String),
}

/// Errors raised by scheduler operations.
///
/// These indicate caller bugs and are never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("job {0} is not temporary")]
    NotTemporary(JobId),

    #[error("position invariant violated on {date}: {detail}")]
    PositionInvariant { date: NaiveDate, detail: String },
}

/// Errors from the run store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("run not found: {0}")]
    NotFound(RunId),

    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    Decode(String),
}
