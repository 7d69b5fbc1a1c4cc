//! Property tests for the scheduler.
//!
//! Random sequences of operations over a populated week must keep every
//! bucket's positions contiguous, and a cross-day move followed by its
//! inverse must restore both days exactly.

use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use shed_id::{JobId, RunId, SourceKey};
use shed_schedule::{DayBuckets, JobDraft, JobRecord, Scheduler, Week};

fn week_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 9).unwrap()
}

fn day(offset: u8) -> NaiveDate {
    week_start() + Days::new(u64::from(offset % 7))
}

fn seeded(layout: &[u8]) -> Scheduler {
    let records = layout.iter().enumerate().map(|(i, offset)| {
        let mut r = JobRecord::new(
            RunId::new(format!("run-{i}")).unwrap(),
            SourceKey::new(format!("block-{}", i % 4)).unwrap(),
            day(*offset).format("%Y-%m-%d").to_string(),
        );
        r.position = Some(i as u32);
        r
    });
    Scheduler::new(DayBuckets::rebuild(Week::starting(week_start()), records))
}

fn ids(s: &Scheduler) -> Vec<JobId> {
    s.buckets()
        .iter()
        .flat_map(|b| b.jobs().iter().map(|j| j.id.clone()))
        .collect()
}

fn snapshot(s: &Scheduler, date: NaiveDate) -> Vec<(JobId, u32)> {
    s.buckets()
        .bucket(date)
        .map(|b| b.jobs().iter().map(|j| (j.id.clone(), j.position)).collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
enum Op {
    Within { pick: usize, target: u32 },
    Across { pick: usize, day: u8, target: u32 },
    Add { day: u8, after: Option<u32> },
    Remove { pick: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<usize>(), 0u32..12).prop_map(|(pick, target)| Op::Within { pick, target }),
        (any::<usize>(), 0u8..7, 0u32..12)
            .prop_map(|(pick, day, target)| Op::Across { pick, day, target }),
        (0u8..7, proptest::option::of(0u32..12)).prop_map(|(day, after)| Op::Add { day, after }),
        any::<usize>().prop_map(|pick| Op::Remove { pick }),
    ]
}

proptest! {
    #[test]
    fn positions_stay_contiguous(
        layout in proptest::collection::vec(0u8..7, 0..20),
        ops in proptest::collection::vec(op(), 1..30),
    ) {
        let mut s = seeded(&layout);
        prop_assert!(s.buckets().check_invariants().is_ok());

        for op in ops {
            let all = ids(&s);
            match op {
                Op::Within { pick, target } if !all.is_empty() => {
                    s.move_within_day(&all[pick % all.len()], target).unwrap();
                }
                Op::Across { pick, day: d, target } if !all.is_empty() => {
                    s.move_across_days(&all[pick % all.len()], day(d), target).unwrap();
                }
                Op::Add { day: d, after } => {
                    s.add_job(day(d), after, JobDraft::new(SourceKey::new("new").unwrap()));
                }
                Op::Remove { pick } if !all.is_empty() => {
                    s.remove_job(&all[pick % all.len()]).unwrap();
                }
                _ => {}
            }

            prop_assert!(s.buckets().check_invariants().is_ok());
            for bucket in s.buckets().iter() {
                let mut positions: Vec<u32> = bucket.jobs().iter().map(|j| j.position).collect();
                positions.sort_unstable();
                let expected: Vec<u32> = (0..bucket.len() as u32).collect();
                prop_assert_eq!(positions, expected);
            }
        }
    }

    #[test]
    fn cross_day_move_round_trips(
        layout in proptest::collection::vec(0u8..7, 1..20),
        pick in any::<usize>(),
        dest in 0u8..7,
        target in 0u32..12,
    ) {
        let mut s = seeded(&layout);
        let all = ids(&s);
        let id = all[pick % all.len()].clone();
        let origin = s.job(&id).unwrap().clone();
        let dest = day(dest);
        prop_assume!(dest != origin.date);

        let source_before = snapshot(&s, origin.date);
        let dest_before = snapshot(&s, dest);

        s.move_across_days(&id, dest, target).unwrap();
        s.move_across_days(&id, origin.date, origin.position).unwrap();

        prop_assert_eq!(snapshot(&s, origin.date), source_before);
        prop_assert_eq!(snapshot(&s, dest), dest_before);
        prop_assert_eq!(s.job(&id).unwrap().date, origin.date);
    }
}
