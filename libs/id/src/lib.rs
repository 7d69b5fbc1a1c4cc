//! # shed-id
//!
//! Identifier types for scheduled runs.
//!
//! ## Durable vs. temporary
//!
//! A run that has been persisted carries a [`RunId`]: an opaque, stable
//! identifier assigned by the run store. A run created locally before the
//! store has confirmed it carries a [`TempRunId`] of the form
//! `tmp_{ulid}`. The prefix marks the id as temporary; it must be replaced
//! by the durable id once creation succeeds.
//!
//! [`JobId`] is the sum of the two and is what every scheduling operation
//! addresses jobs by.

mod error;
mod temp;
mod types;

pub use error::IdError;
pub use temp::TempRunId;
pub use types::{ExternalTag, JobId, RunId, SourceKey};
pub use ulid::Ulid;
