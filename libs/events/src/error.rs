//! Error types for event handling.

use thiserror::Error;

/// Errors that can occur when fetching or parsing completion events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The payload is not valid JSON.
    #[error("malformed event payload: {0}")]
    MalformedPayload(String),

    /// No batch tag on the event or in its payload.
    #[error("event has no batch tag")]
    MissingTag,

    /// No source block key in the payload.
    #[error("event {tag} has no source block key")]
    MissingSourceKey { tag: String },

    /// The feed could not be read.
    #[error("event feed unavailable: {0}")]
    Feed(String),
}

impl EventError {
    /// Returns true if the payload itself could not be decoded.
    ///
    /// Missing fields are not parse failures; those events are well-formed
    /// but irrelevant to reconciliation.
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, EventError::MalformedPayload(_))
    }
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::MalformedPayload(err.to_string())
    }
}
