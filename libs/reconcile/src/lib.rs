//! Batch-tag reconciliation.
//!
//! Completion events from the packing line name the block a batch came
//! from. Runs that are in process on that block for the day and do not yet
//! carry a batch tag receive the event's tag. Key properties:
//!
//! - **Write-once**: a run that already has a tag is never re-tagged. This
//!   is also how repeated deliveries of the same event are absorbed.
//! - **Per-item isolation**: a malformed event or a failed patch affects
//!   only that event or run; the rest of the batch still applies.
//! - **Self-healing**: a run whose patch failed still lacks a tag, so the
//!   next poll picks it up again.
//!
//! [`plan_updates`] computes what to write from a snapshot;
//! [`ReconciliationEngine`] fetches snapshots on a timer and writes the
//! plan through the run store.

mod engine;
mod error;
mod plan;

pub use engine::{Clock, FixedClock, ReconcilerConfig, ReconciliationEngine, SystemClock, TickReport};
pub use error::ReconcileError;
pub use plan::{plan_updates, MatchPlan, TagUpdate};

use std::time::Duration;

/// Default interval between polls of the completion feed.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60);
