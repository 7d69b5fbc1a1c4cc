//! # shed-schedule
//!
//! The weekly run schedule.
//!
//! Runs are grouped into one bucket per calendar day. Within a bucket the
//! order is given by each run's `position`.
//!
//! ## Invariants
//!
//! - Every bucket's positions are exactly `0..len`, with no gaps or
//!   duplicates, between any two operations.
//! - Every loaded record lands in exactly one bucket, or is kept aside as
//!   unassigned and counted. Nothing is dropped silently.
//! - Only [`Scheduler`] changes bucket membership or placement. It never
//!   touches a run's external tag.
//!
//! ## Flow
//!
//! Records from the [`JobStore`] pass through the date normalizer into
//! [`DayBuckets`]. Scheduler operations mutate the buckets and return a
//! [`ScheduleDiff`] describing what the caller must persist.

mod bucket;
mod calendar;
mod error;
mod job;
pub mod normalize;
mod scheduler;
mod store;

pub use bucket::{DayBucket, DayBuckets, GroupingReport, UnassignedRecord};
pub use calendar::{DateRange, Week};
pub use error::{DateError, ScheduleError, ScheduleResult, StoreError};
pub use job::{Job, JobDraft, JobPayload, JobRecord, JobStatus, PatchFields, PositionUpdate};
pub use normalize::{normalize, DateMatch, MatchTier};
pub use scheduler::{Checkpoint, JobChange, ScheduleDiff, Scheduler};
pub use store::JobStore;
