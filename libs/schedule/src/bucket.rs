//! Day buckets: runs grouped by canonical date.
//!
//! Buckets are a projection of the store's records, rebuilt on every load
//! and never persisted themselves.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use shed_id::JobId;
use tracing::{debug, info};

use crate::normalize::{normalize, MatchTier};
use crate::{DateError, Job, JobRecord, ScheduleError, ScheduleResult, Week};

/// The ordered runs of one day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayBucket {
    date: NaiveDate,
    jobs: Vec<Job>,
}

impl DayBucket {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            jobs: Vec::new(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Runs in position order.
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn index_of(&self, id: &JobId) -> Option<usize> {
        self.jobs.iter().position(|job| &job.id == id)
    }

    pub(crate) fn jobs_mut(&mut self) -> &mut Vec<Job> {
        &mut self.jobs
    }

    /// Inserts at `index`, appending when `index` is past the end.
    pub(crate) fn insert(&mut self, index: usize, mut job: Job) {
        job.date = self.date;
        let index = index.min(self.jobs.len());
        self.jobs.insert(index, job);
        self.renumber();
    }

    pub(crate) fn remove(&mut self, index: usize) -> Job {
        let job = self.jobs.remove(index);
        self.renumber();
        job
    }

    /// Rewrites positions to match vector order.
    pub(crate) fn renumber(&mut self) {
        for (position, job) in (0u32..).zip(self.jobs.iter_mut()) {
            job.position = position;
        }
    }

    /// Checks that positions are exactly `0..len` in order.
    pub fn check(&self) -> ScheduleResult<()> {
        for (expected, job) in (0u32..).zip(self.jobs.iter()) {
            if job.position != expected {
                return Err(ScheduleError::PositionInvariant {
                    date: self.date,
                    detail: format!(
                        "job {} at index {} has position {}",
                        job.id, expected, job.position
                    ),
                });
            }
            if job.date != self.date {
                return Err(ScheduleError::PositionInvariant {
                    date: self.date,
                    detail: format!("job {} is dated {}", job.id, job.date),
                });
            }
        }
        Ok(())
    }
}

/// Counts of how records were placed during a rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupingReport {
    pub direct: usize,
    pub weekday_fallback: usize,
    pub reparsed: usize,
    pub unassigned: usize,
}

impl GroupingReport {
    fn record(&mut self, tier: MatchTier) {
        match tier {
            MatchTier::Direct => self.direct += 1,
            MatchTier::WeekdayFallback => self.weekday_fallback += 1,
            MatchTier::Reparsed => self.reparsed += 1,
        }
    }

    pub fn assigned(&self) -> usize {
        self.direct + self.weekday_fallback + self.reparsed
    }
}

/// A record whose date could not be placed.
#[derive(Debug, Clone, PartialEq)]
pub struct UnassignedRecord {
    pub record: JobRecord,
    pub error: DateError,
}

/// All buckets of the active week.
#[derive(Debug, Clone, PartialEq)]
pub struct DayBuckets {
    week: Week,
    buckets: BTreeMap<NaiveDate, DayBucket>,
    unassigned: Vec<UnassignedRecord>,
    report: GroupingReport,
}

impl DayBuckets {
    /// Seven empty buckets for `week`.
    pub fn empty(week: Week) -> Self {
        Self {
            week,
            buckets: week.days().map(|day| (day, DayBucket::new(day))).collect(),
            unassigned: Vec::new(),
            report: GroupingReport::default(),
        }
    }

    /// Groups `records` by normalized date.
    ///
    /// Each bucket is ordered by stored position; records without one sort
    /// last. Ties keep load order, which also decides between records that
    /// the weekday fallback sends to the same day. Positions are then
    /// renumbered to `0..len`.
    pub fn rebuild(week: Week, records: impl IntoIterator<Item = JobRecord>) -> Self {
        let mut this = Self::empty(week);
        let mut staged: BTreeMap<NaiveDate, Vec<(Option<u32>, Job)>> = BTreeMap::new();

        for record in records {
            match normalize(record.date.as_deref(), &week) {
                Ok(hit) => {
                    if hit.tier != MatchTier::Direct {
                        debug!(
                            job_id = %record.id,
                            raw = record.date.as_deref().unwrap_or_default(),
                            key = %hit.key,
                            tier = %hit.tier,
                            "Run date normalized"
                        );
                    }
                    this.report.record(hit.tier);
                    let stored = record.position;
                    staged
                        .entry(hit.key)
                        .or_default()
                        .push((stored, Job::from_record(record, hit.key, 0)));
                }
                Err(error) => {
                    debug!(job_id = %record.id, error = %error, "Run left unassigned");
                    this.report.unassigned += 1;
                    this.unassigned.push(UnassignedRecord { record, error });
                }
            }
        }

        for (date, mut entries) in staged {
            entries.sort_by_key(|(stored, _)| (stored.is_none(), *stored));
            let bucket = this.bucket_entry(date);
            bucket.jobs_mut().extend(entries.into_iter().map(|(_, job)| job));
            bucket.renumber();
        }

        info!(
            week_start = %week.start(),
            direct = this.report.direct,
            weekday_fallback = this.report.weekday_fallback,
            reparsed = this.report.reparsed,
            unassigned = this.report.unassigned,
            "Grouping complete"
        );

        this
    }

    pub fn week(&self) -> Week {
        self.week
    }

    pub fn report(&self) -> GroupingReport {
        self.report
    }

    /// Records whose dates could not be resolved, in load order.
    pub fn unassigned(&self) -> &[UnassignedRecord] {
        &self.unassigned
    }

    pub fn bucket(&self, date: NaiveDate) -> Option<&DayBucket> {
        self.buckets.get(&date)
    }

    /// Buckets in date order.
    pub fn iter(&self) -> impl Iterator<Item = &DayBucket> {
        self.buckets.values()
    }

    /// Finds the day and index of a run.
    pub fn locate(&self, id: &JobId) -> Option<(NaiveDate, usize)> {
        self.buckets
            .values()
            .find_map(|bucket| bucket.index_of(id).map(|index| (bucket.date(), index)))
    }

    pub fn job(&self, id: &JobId) -> Option<&Job> {
        let (date, index) = self.locate(id)?;
        self.buckets.get(&date).map(|bucket| &bucket.jobs()[index])
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(DayBucket::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks every bucket's position invariant.
    pub fn check_invariants(&self) -> ScheduleResult<()> {
        self.buckets.values().try_for_each(DayBucket::check)
    }

    pub(crate) fn job_mut(&mut self, id: &JobId) -> Option<&mut Job> {
        let (date, index) = self.locate(id)?;
        self.buckets
            .get_mut(&date)
            .map(|bucket| &mut bucket.jobs_mut()[index])
    }

    /// The bucket for `date`, created if the date is outside the week.
    pub(crate) fn bucket_entry(&mut self, date: NaiveDate) -> &mut DayBucket {
        self.buckets
            .entry(date)
            .or_insert_with(|| DayBucket::new(date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shed_id::{RunId, SourceKey};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn week() -> Week {
        Week::starting(d(2024, 6, 9))
    }

    fn record(id: &str, date: Option<&str>, position: Option<u32>) -> JobRecord {
        let mut r = JobRecord::new(
            RunId::new(id).unwrap(),
            SourceKey::new("B1").unwrap(),
            "",
        );
        r.date = date.map(str::to_string);
        r.position = position;
        r
    }

    fn ids(bucket: &DayBucket) -> Vec<String> {
        bucket.jobs().iter().map(|j| j.id.to_string()).collect()
    }

    #[test]
    fn test_empty_week_has_seven_buckets() {
        let buckets = DayBuckets::empty(week());
        assert_eq!(buckets.iter().count(), 7);
        assert!(buckets.is_empty());
    }

    #[test]
    fn test_rebuild_sorts_and_renumbers() {
        let buckets = DayBuckets::rebuild(
            week(),
            vec![
                record("c", Some("2024-06-10"), None),
                record("b", Some("2024-06-10"), Some(5)),
                record("a", Some("2024-06-10"), Some(2)),
            ],
        );

        let monday = buckets.bucket(d(2024, 6, 10)).unwrap();
        assert_eq!(ids(monday), vec!["a", "b", "c"]);
        assert_eq!(
            monday.jobs().iter().map(|j| j.position).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        buckets.check_invariants().unwrap();
    }

    #[test]
    fn test_weekday_collision_keeps_append_order() {
        // Both land on Monday 2024-06-10, neither has a stored position.
        let buckets = DayBuckets::rebuild(
            week(),
            vec![
                record("next-week", Some("2024-06-17"), None),
                record("this-week", Some("2024-06-10"), None),
                record("last-week", Some("2024-06-03"), None),
            ],
        );

        let monday = buckets.bucket(d(2024, 6, 10)).unwrap();
        assert_eq!(ids(monday), vec!["next-week", "this-week", "last-week"]);
        assert_eq!(buckets.report().direct, 1);
        assert_eq!(buckets.report().weekday_fallback, 2);
    }

    #[test]
    fn test_unparseable_is_counted_not_dropped() {
        let buckets = DayBuckets::rebuild(
            week(),
            vec![
                record("ok", Some("2024-06-11"), Some(0)),
                record("bad", Some("someday"), Some(0)),
                record("missing", None, None),
            ],
        );

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets.report().unassigned, 2);
        assert_eq!(buckets.report().assigned(), 1);
        let unassigned: Vec<_> = buckets
            .unassigned()
            .iter()
            .map(|u| u.record.id.to_string())
            .collect();
        assert_eq!(unassigned, vec!["bad", "missing"]);
    }

    #[test]
    fn test_fallback_rewrites_job_date() {
        let buckets = DayBuckets::rebuild(week(), vec![record("x", Some("2024-06-20"), None)]);
        // Thursday of the following week lands on Thursday 2024-06-13.
        let job = buckets.job(&shed_id::JobId::parse("x").unwrap()).unwrap();
        assert_eq!(job.date, d(2024, 6, 13));
    }

    #[test]
    fn test_check_reports_gap() {
        let mut buckets = DayBuckets::rebuild(
            week(),
            vec![
                record("a", Some("2024-06-10"), None),
                record("b", Some("2024-06-10"), None),
            ],
        );
        let bucket = buckets.bucket_entry(d(2024, 6, 10));
        bucket.jobs_mut()[1].position = 4;
        assert!(matches!(
            buckets.check_invariants(),
            Err(ScheduleError::PositionInvariant { .. })
        ));
    }
}
