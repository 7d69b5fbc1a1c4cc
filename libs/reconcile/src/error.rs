//! Reconciliation errors.

use shed_events::EventError;
use shed_schedule::StoreError;
use thiserror::Error;

/// Errors that abort a whole tick. Per-run failures never surface here.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The run snapshot could not be loaded.
    #[error("failed to load runs: {0}")]
    Store(#[from] StoreError),

    /// The completion feed could not be read.
    #[error("failed to read completion feed: {0}")]
    Feed(#[from] EventError),

    /// Another tick was still running; this one did nothing.
    #[error("reconciliation tick already in progress")]
    TickInProgress,
}
