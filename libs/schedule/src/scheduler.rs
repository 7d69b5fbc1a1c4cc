//! Scheduling operations over day buckets.
//!
//! Each operation mutates the buckets in full (removal, insertion, and
//! renumbering) before returning, and hands back a [`ScheduleDiff`] of
//! every run whose date or position the store must learn about. Callers
//! that persist optimistically take a [`Checkpoint`] first and
//! [`Scheduler::restore`] it if persistence fails.

use chrono::{DateTime, NaiveDate, Utc};
use shed_id::JobId;
use tracing::debug;

use crate::{
    DayBucket, DayBuckets, GroupingReport, Job, JobDraft, JobRecord, JobStatus, PatchFields,
    PositionUpdate, ScheduleError, ScheduleResult, Week,
};

/// The new placement of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobChange {
    pub id: JobId,
    pub date: NaiveDate,
    pub position: u32,
    /// The run moved to a different day.
    pub date_changed: bool,
}

/// Placement changes produced by one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleDiff {
    pub changes: Vec<JobChange>,
    pub created: Option<JobId>,
    pub removed: Option<JobId>,
}

impl ScheduleDiff {
    fn push_bucket(&mut self, bucket: &DayBucket) {
        self.changes
            .extend(bucket.jobs().iter().map(|job| JobChange {
                id: job.id.clone(),
                date: job.date,
                position: job.position,
                date_changed: false,
            }));
    }

    fn mark_moved(&mut self, id: &JobId) {
        if let Some(change) = self.changes.iter_mut().find(|c| &c.id == id) {
            change.date_changed = true;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.created.is_none() && self.removed.is_none()
    }

    pub fn change(&self, id: &JobId) -> Option<&JobChange> {
        self.changes.iter().find(|c| &c.id == id)
    }

    /// Runs that moved to another day.
    pub fn date_changes(&self) -> impl Iterator<Item = &JobChange> {
        self.changes.iter().filter(|c| c.date_changed)
    }

    /// Position updates for persisted runs; temporary runs are skipped.
    pub fn reorder_batch(&self) -> Vec<PositionUpdate> {
        self.changes
            .iter()
            .filter_map(|c| {
                c.id.durable().map(|id| PositionUpdate {
                    id: id.clone(),
                    position: c.position,
                })
            })
            .collect()
    }

    /// Rewrites references to `temp` after the store assigned `durable`.
    pub fn rebind(&mut self, temp: &JobId, durable: &JobId) {
        for change in &mut self.changes {
            if &change.id == temp {
                change.id = durable.clone();
            }
        }
        for id in [&mut self.created, &mut self.removed].into_iter().flatten() {
            if id == temp {
                *id = durable.clone();
            }
        }
    }
}

/// A saved copy of the buckets.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    buckets: DayBuckets,
}

/// Owner of the day buckets and the only writer of run placement.
#[derive(Debug, Clone)]
pub struct Scheduler {
    buckets: DayBuckets,
}

impl Scheduler {
    pub fn new(buckets: DayBuckets) -> Self {
        Self { buckets }
    }

    /// A scheduler over an empty week.
    pub fn empty(week: Week) -> Self {
        Self::new(DayBuckets::empty(week))
    }

    /// Replaces all state with a fresh projection of `records`.
    pub fn load(&mut self, week: Week, records: impl IntoIterator<Item = JobRecord>) -> GroupingReport {
        self.buckets = DayBuckets::rebuild(week, records);
        self.buckets.report()
    }

    pub fn buckets(&self) -> &DayBuckets {
        &self.buckets
    }

    pub fn job(&self, id: &JobId) -> Option<&Job> {
        self.buckets.job(id)
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            buckets: self.buckets.clone(),
        }
    }

    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.buckets = checkpoint.buckets;
    }

    fn locate(&self, id: &JobId) -> ScheduleResult<(NaiveDate, usize)> {
        self.buckets
            .locate(id)
            .ok_or_else(|| ScheduleError::JobNotFound(id.clone()))
    }

    fn bucket_mut(&mut self, date: NaiveDate) -> &mut DayBucket {
        self.buckets.bucket_entry(date)
    }

    fn debug_check(&self) {
        debug_assert!(
            self.buckets.check_invariants().is_ok(),
            "{:?}",
            self.buckets.check_invariants()
        );
    }

    /// Moves a run to `target` within its day.
    ///
    /// `target` is clamped to the bucket after removal. Every run in the
    /// bucket is reported, since any of their positions may have shifted.
    pub fn move_within_day(&mut self, id: &JobId, target: u32) -> ScheduleResult<ScheduleDiff> {
        let (date, index) = self.locate(id)?;
        let bucket = self.bucket_mut(date);

        let job = bucket.jobs_mut().remove(index);
        let target = (target as usize).min(bucket.len());
        bucket.jobs_mut().insert(target, job);
        bucket.renumber();

        let mut diff = ScheduleDiff::default();
        diff.push_bucket(bucket);
        debug!(job_id = %id, %date, from = index, to = target, "Moved run within day");
        self.debug_check();
        Ok(diff)
    }

    /// Moves a run to `target` on `target_date`.
    ///
    /// An out-of-range `target` appends. Both buckets are reported; the
    /// moved run is flagged with `date_changed`. Moving to the run's own
    /// day is a within-day move.
    pub fn move_across_days(
        &mut self,
        id: &JobId,
        target_date: NaiveDate,
        target: u32,
    ) -> ScheduleResult<ScheduleDiff> {
        let (source_date, index) = self.locate(id)?;
        if source_date == target_date {
            return self.move_within_day(id, target);
        }

        let job = self.bucket_mut(source_date).remove(index);
        self.bucket_mut(target_date).insert(target as usize, job);

        let mut diff = ScheduleDiff::default();
        if let Some(source) = self.buckets.bucket(source_date) {
            diff.push_bucket(source);
        }
        if let Some(dest) = self.buckets.bucket(target_date) {
            diff.push_bucket(dest);
        }
        diff.mark_moved(id);

        debug!(
            job_id = %id,
            from = %source_date,
            to = %target_date,
            "Moved run across days"
        );
        self.debug_check();
        Ok(diff)
    }

    /// Adds a new run under a temporary id.
    ///
    /// With `after_position` the run goes directly after that position,
    /// otherwise at the end of the day.
    pub fn add_job(
        &mut self,
        date: NaiveDate,
        after_position: Option<u32>,
        draft: JobDraft,
    ) -> ScheduleDiff {
        let id = JobId::temp();
        let bucket = self.bucket_mut(date);
        let index = match after_position {
            Some(after) => (after as usize).saturating_add(1).min(bucket.len()),
            None => bucket.len(),
        };
        bucket.insert(index, Job::from_draft(id.clone(), draft, date, 0));

        let mut diff = ScheduleDiff {
            created: Some(id.clone()),
            ..Default::default()
        };
        diff.push_bucket(bucket);
        debug!(job_id = %id, %date, position = index, "Added run");
        self.debug_check();
        diff
    }

    /// Deletes a run and closes the gap it leaves.
    pub fn remove_job(&mut self, id: &JobId) -> ScheduleResult<ScheduleDiff> {
        let (date, index) = self.locate(id)?;
        let bucket = self.bucket_mut(date);
        bucket.remove(index);

        let mut diff = ScheduleDiff {
            removed: Some(id.clone()),
            ..Default::default()
        };
        diff.push_bucket(bucket);
        debug!(job_id = %id, %date, "Removed run");
        self.debug_check();
        Ok(diff)
    }

    /// Swaps a temporary id for the store's durable one.
    ///
    /// Placement is kept; the stored record's tag and status, which may
    /// already have been written by others, are adopted.
    pub fn replace_id(&mut self, temp: &JobId, stored: &JobRecord) -> ScheduleResult<()> {
        if !temp.is_temp() {
            return Err(ScheduleError::NotTemporary(temp.clone()));
        }
        let job = self
            .buckets
            .job_mut(temp)
            .ok_or_else(|| ScheduleError::JobNotFound(temp.clone()))?;

        job.id = stored.id.clone();
        if job.external_tag.is_none() {
            job.external_tag = stored.external_tag.clone();
        }
        job.status = stored.status;
        debug!(temp_id = %temp, job_id = %stored.id, "Replaced temporary id");
        Ok(())
    }

    /// Moves a run into `status`.
    ///
    /// Returns the fields to persist, or `None` if the run already had that
    /// status.
    pub fn set_status(
        &mut self,
        id: &JobId,
        status: JobStatus,
        at: DateTime<Utc>,
    ) -> ScheduleResult<Option<PatchFields>> {
        let job = self
            .buckets
            .job_mut(id)
            .ok_or_else(|| ScheduleError::JobNotFound(id.clone()))?;

        if !job.set_status(status, at) {
            return Ok(None);
        }
        debug!(job_id = %id, %status, "Run status changed");
        Ok(Some(PatchFields::status(job)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shed_id::{RunId, SourceKey};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn id(s: &str) -> JobId {
        JobId::Durable(RunId::new(s).unwrap())
    }

    fn record(name: &str, date: &str, position: u32) -> JobRecord {
        let mut r = JobRecord::new(
            RunId::new(name).unwrap(),
            SourceKey::new(format!("block-{name}")).unwrap(),
            date,
        );
        r.position = Some(position);
        r
    }

    fn scheduler(records: Vec<JobRecord>) -> Scheduler {
        Scheduler::new(DayBuckets::rebuild(Week::starting(d(2024, 6, 9)), records))
    }

    fn order(s: &Scheduler, date: NaiveDate) -> Vec<(String, u32)> {
        s.buckets()
            .bucket(date)
            .map(|b| {
                b.jobs()
                    .iter()
                    .map(|j| (j.id.to_string(), j.position))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn pairs(items: &[(&str, u32)]) -> Vec<(String, u32)> {
        items.iter().map(|(s, p)| (s.to_string(), *p)).collect()
    }

    #[test]
    fn test_move_to_front() {
        let mut s = scheduler(vec![
            record("X", "2024-06-10", 0),
            record("Y", "2024-06-10", 1),
            record("Z", "2024-06-10", 2),
        ]);

        let diff = s.move_within_day(&id("Z"), 0).unwrap();

        assert_eq!(
            order(&s, d(2024, 6, 10)),
            pairs(&[("Z", 0), ("X", 1), ("Y", 2)])
        );
        assert_eq!(diff.changes.len(), 3);
        assert!(diff.date_changes().next().is_none());
    }

    #[test]
    fn test_move_within_day_clamps() {
        let mut s = scheduler(vec![
            record("A", "2024-06-10", 0),
            record("B", "2024-06-10", 1),
        ]);
        s.move_within_day(&id("A"), 99).unwrap();
        assert_eq!(order(&s, d(2024, 6, 10)), pairs(&[("B", 0), ("A", 1)]));
    }

    #[test]
    fn test_move_across_days() {
        let mut s = scheduler(vec![
            record("U", "2024-06-10", 0),
            record("W", "2024-06-10", 1),
            record("V", "2024-06-11", 0),
        ]);

        let diff = s.move_across_days(&id("W"), d(2024, 6, 11), 0).unwrap();

        assert_eq!(order(&s, d(2024, 6, 10)), pairs(&[("U", 0)]));
        assert_eq!(order(&s, d(2024, 6, 11)), pairs(&[("W", 0), ("V", 1)]));
        assert_eq!(s.job(&id("W")).unwrap().date, d(2024, 6, 11));

        let moved: Vec<_> = diff.date_changes().map(|c| c.id.clone()).collect();
        assert_eq!(moved, vec![id("W")]);
        assert_eq!(diff.changes.len(), 3);
    }

    #[test]
    fn test_move_across_days_appends_out_of_range() {
        let mut s = scheduler(vec![
            record("A", "2024-06-10", 0),
            record("B", "2024-06-11", 0),
        ]);
        s.move_across_days(&id("A"), d(2024, 6, 11), 7).unwrap();
        assert_eq!(order(&s, d(2024, 6, 11)), pairs(&[("B", 0), ("A", 1)]));
    }

    #[test]
    fn test_move_outside_week_creates_bucket() {
        let mut s = scheduler(vec![record("A", "2024-06-10", 0)]);
        s.move_across_days(&id("A"), d(2024, 6, 20), 0).unwrap();
        assert_eq!(order(&s, d(2024, 6, 20)), pairs(&[("A", 0)]));
        s.buckets().check_invariants().unwrap();
    }

    #[test]
    fn test_move_across_same_day_is_within_day() {
        let mut s = scheduler(vec![
            record("A", "2024-06-10", 0),
            record("B", "2024-06-10", 1),
        ]);
        let diff = s.move_across_days(&id("B"), d(2024, 6, 10), 0).unwrap();
        assert_eq!(order(&s, d(2024, 6, 10)), pairs(&[("B", 0), ("A", 1)]));
        assert!(diff.date_changes().next().is_none());
    }

    #[test]
    fn test_unknown_job() {
        let mut s = scheduler(vec![]);
        assert_eq!(
            s.move_within_day(&id("nope"), 0).unwrap_err(),
            ScheduleError::JobNotFound(id("nope"))
        );
        assert!(s.remove_job(&id("nope")).is_err());
    }

    #[test]
    fn test_add_job_appends() {
        let mut s = scheduler(vec![record("A", "2024-06-12", 0)]);
        let diff = s.add_job(d(2024, 6, 12), None, JobDraft::new(SourceKey::new("B9").unwrap()));

        let created = diff.created.clone().unwrap();
        assert!(created.is_temp());
        let job = s.job(&created).unwrap();
        assert_eq!(job.position, 1);
        assert_eq!(job.status, JobStatus::NotStarted);
        // Temporary runs are not sent in reorder batches.
        assert_eq!(diff.reorder_batch().len(), 1);
    }

    #[test]
    fn test_add_job_after_position() {
        let mut s = scheduler(vec![
            record("A", "2024-06-12", 0),
            record("B", "2024-06-12", 1),
        ]);
        let diff = s.add_job(
            d(2024, 6, 12),
            Some(0),
            JobDraft::new(SourceKey::new("B9").unwrap()),
        );
        let created = diff.created.unwrap();
        assert_eq!(s.job(&created).unwrap().position, 1);
        assert_eq!(s.job(&id("B")).unwrap().position, 2);
    }

    #[test]
    fn test_replace_id_and_rebind() {
        let mut s = scheduler(vec![record("A", "2024-06-12", 0)]);
        let mut diff = s.add_job(d(2024, 6, 12), None, JobDraft::new(SourceKey::new("B9").unwrap()));
        let temp = diff.created.clone().unwrap();

        let stored = record("durable-1", "2024-06-12", 1);
        s.replace_id(&temp, &stored).unwrap();
        diff.rebind(&temp, &stored.id);

        assert!(s.job(&temp).is_none());
        assert_eq!(s.job(&stored.id).unwrap().position, 1);
        assert_eq!(diff.created, Some(stored.id.clone()));
        assert_eq!(diff.reorder_batch().len(), 2);
    }

    #[test]
    fn test_replace_id_rejects_durable() {
        let mut s = scheduler(vec![record("A", "2024-06-12", 0)]);
        let stored = record("B", "2024-06-12", 0);
        assert_eq!(
            s.replace_id(&id("A"), &stored).unwrap_err(),
            ScheduleError::NotTemporary(id("A"))
        );
    }

    #[test]
    fn test_remove_job_renumbers() {
        let mut s = scheduler(vec![
            record("A", "2024-06-13", 0),
            record("B", "2024-06-13", 1),
            record("C", "2024-06-13", 2),
        ]);
        let diff = s.remove_job(&id("A")).unwrap();
        assert_eq!(order(&s, d(2024, 6, 13)), pairs(&[("B", 0), ("C", 1)]));
        assert_eq!(diff.removed, Some(id("A")));
    }

    #[test]
    fn test_checkpoint_restore() {
        let mut s = scheduler(vec![
            record("A", "2024-06-10", 0),
            record("B", "2024-06-10", 1),
        ]);
        let before = order(&s, d(2024, 6, 10));
        let cp = s.checkpoint();

        s.move_across_days(&id("A"), d(2024, 6, 14), 0).unwrap();
        s.restore(cp);

        assert_eq!(order(&s, d(2024, 6, 10)), before);
        assert!(order(&s, d(2024, 6, 14)).is_empty());
    }

    #[test]
    fn test_set_status_patch() {
        let mut s = scheduler(vec![record("A", "2024-06-10", 0)]);
        let at = Utc.with_ymd_and_hms(2024, 6, 10, 6, 0, 0).unwrap();

        let patch = s.set_status(&id("A"), JobStatus::InProcess, at).unwrap().unwrap();
        assert_eq!(patch.status, Some(JobStatus::InProcess));
        assert_eq!(patch.time_started, Some(at));
        assert!(patch.external_tag.is_none());

        assert!(s.set_status(&id("A"), JobStatus::InProcess, at).unwrap().is_none());
    }
}
