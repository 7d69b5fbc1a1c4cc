//! Identifier parsing errors.

use thiserror::Error;

/// Errors from parsing run identifiers and external keys.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// Blank input where an identifier or key is required.
    #[error("identifier cannot be blank")]
    Empty,

    /// The input lacks the `tmp_` marker of a temporary run id.
    #[error("not a temporary run id: {0:?}")]
    NotTemporary(String),

    /// The part after `tmp_` is not a ULID.
    #[error("temporary run id has an invalid ULID: {0}")]
    InvalidUlid(String),
}
