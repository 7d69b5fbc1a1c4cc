//! Calendar controller.
//!
//! Applies a scheduling operation in memory first, then writes the
//! resulting diff to the run store. If a write fails, the in-memory state
//! is restored from a checkpoint taken before the operation, so what the
//! user sees never drifts from what was last confirmed.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use shed_id::JobId;
use shed_schedule::{
    Checkpoint, GroupingReport, JobDraft, JobStatus, JobStore, PatchFields, ScheduleDiff,
    ScheduleError, Scheduler, StoreError, Week,
};
use thiserror::Error;
use tracing::{info, warn};

/// Errors from controller operations.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The operation itself was invalid; nothing was changed.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    /// The store rejected the change; in-memory state was rolled back.
    #[error("failed to persist schedule change: {0}")]
    Persistence(#[from] StoreError),
}

pub type ControllerResult<T> = Result<T, ControllerError>;

/// Owns the week's scheduler and keeps it in step with the run store.
pub struct CalendarController {
    scheduler: Scheduler,
    store: Arc<dyn JobStore>,
}

impl CalendarController {
    pub fn new(store: Arc<dyn JobStore>, week: Week) -> Self {
        Self {
            scheduler: Scheduler::empty(week),
            store,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn week(&self) -> Week {
        self.scheduler.buckets().week()
    }

    /// Loads `week` from the store, replacing the current state.
    ///
    /// On failure the previously loaded week is kept.
    pub async fn load_week(&mut self, week: Week) -> ControllerResult<GroupingReport> {
        let records = self.store.list(week.range()).await?;
        let report = self.scheduler.load(week, records);
        info!(
            week_start = %week.start(),
            assigned = report.assigned(),
            unassigned = report.unassigned,
            "Week loaded"
        );
        Ok(report)
    }

    fn rollback(&mut self, checkpoint: Checkpoint, err: StoreError, action: &str) -> ControllerError {
        warn!(error = %err, "Failed to persist {}, rolling back", action);
        self.scheduler.restore(checkpoint);
        ControllerError::Persistence(err)
    }

    async fn write_positions(&self, diff: &ScheduleDiff) -> Result<(), StoreError> {
        self.store.reorder(&diff.reorder_batch()).await
    }

    /// Reorders a run within its day.
    pub async fn move_within_day(&mut self, id: &JobId, target: u32) -> ControllerResult<ScheduleDiff> {
        let checkpoint = self.scheduler.checkpoint();
        let diff = self.scheduler.move_within_day(id, target)?;

        if let Err(e) = self.write_positions(&diff).await {
            return Err(self.rollback(checkpoint, e, "reorder"));
        }
        Ok(diff)
    }

    /// Moves a run to another day.
    ///
    /// The moved run's new date is patched first, then positions on both
    /// days are written in one batch. If that batch fails, the run's
    /// original date and position are patched back before rolling back.
    pub async fn move_across_days(
        &mut self,
        id: &JobId,
        date: NaiveDate,
        target: u32,
    ) -> ControllerResult<ScheduleDiff> {
        let checkpoint = self.scheduler.checkpoint();
        let origin = self.scheduler.job(id).map(|job| (job.date, job.position));
        let diff = self.scheduler.move_across_days(id, date, target)?;

        let mut patched = Vec::new();
        for change in diff.date_changes() {
            if let Some(run_id) = change.id.durable() {
                let fields = PatchFields::placement(change.date, change.position);
                if let Err(e) = self.store.patch(run_id, &fields).await {
                    return Err(self.rollback(checkpoint, e, "move"));
                }
                patched.push(run_id.clone());
            }
        }

        if let Err(e) = self.write_positions(&diff).await {
            if let Some((origin_date, origin_position)) = origin {
                let fields = PatchFields::placement(origin_date, origin_position);
                for run_id in &patched {
                    if let Err(revert) = self.store.patch(run_id, &fields).await {
                        warn!(
                            run_id = %run_id,
                            date = %origin_date,
                            error = %revert,
                            "Failed to restore run placement after move"
                        );
                    }
                }
            }
            return Err(self.rollback(checkpoint, e, "move"));
        }
        Ok(diff)
    }

    /// Adds a run and returns its durable id.
    ///
    /// The run is created in the store before positions are written. If the
    /// position write fails, the new record is deleted again before rolling
    /// back.
    pub async fn add_job(
        &mut self,
        date: NaiveDate,
        after_position: Option<u32>,
        draft: JobDraft,
    ) -> ControllerResult<JobId> {
        let checkpoint = self.scheduler.checkpoint();
        let mut diff = self.scheduler.add_job(date, after_position, draft);
        let created = diff
            .created
            .as_ref()
            .and_then(|id| self.scheduler.job(id))
            .map(|job| (job.id.clone(), job.to_payload()));
        let Some((temp, payload)) = created else {
            self.scheduler.restore(checkpoint);
            return Err(ScheduleError::PositionInvariant {
                date,
                detail: "new run missing after insert".to_string(),
            }
            .into());
        };

        let stored = match self.store.create(&payload).await {
            Ok(stored) => stored,
            Err(e) => return Err(self.rollback(checkpoint, e, "new run")),
        };

        self.scheduler.replace_id(&temp, &stored)?;
        diff.rebind(&temp, &stored.id);

        if let Err(e) = self.write_positions(&diff).await {
            if let Some(run_id) = stored.id.durable() {
                if let Err(cleanup) = self.store.delete(run_id).await {
                    warn!(job_id = %stored.id, error = %cleanup, "Failed to remove orphaned run");
                }
            }
            return Err(self.rollback(checkpoint, e, "new run positions"));
        }

        Ok(stored.id)
    }

    /// Deletes a run.
    ///
    /// Runs that were never stored are removed from memory only. Once the
    /// store has deleted a run, a failed position write is logged but not
    /// rolled back; the gap closes on the next load.
    pub async fn remove_job(&mut self, id: &JobId) -> ControllerResult<ScheduleDiff> {
        let checkpoint = self.scheduler.checkpoint();
        let diff = self.scheduler.remove_job(id)?;

        let Some(run_id) = id.durable() else {
            return Ok(diff);
        };

        if let Err(e) = self.store.delete(run_id).await {
            return Err(self.rollback(checkpoint, e, "delete"));
        }
        if let Err(e) = self.write_positions(&diff).await {
            warn!(job_id = %id, error = %e, "Run deleted but positions not written");
        }
        Ok(diff)
    }

    /// Changes a run's status. Returns false if it already had `status`.
    pub async fn set_status(
        &mut self,
        id: &JobId,
        status: JobStatus,
        at: DateTime<Utc>,
    ) -> ControllerResult<bool> {
        let checkpoint = self.scheduler.checkpoint();
        let Some(fields) = self.scheduler.set_status(id, status, at)? else {
            return Ok(false);
        };

        if let Some(run_id) = id.durable() {
            if let Err(e) = self.store.patch(run_id, &fields).await {
                return Err(self.rollback(checkpoint, e, "status"));
            }
        }
        Ok(true)
    }
}
