//! Engine tests against the in-memory store and feed.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::{json, Value};
use shed_events::RawCompletionEvent;
use shed_id::{ExternalTag, RunId, SourceKey};
use shed_reconcile::{FixedClock, ReconcileError, ReconcilerConfig, ReconciliationEngine};
use shed_schedule::{JobRecord, JobStatus};
use shed_testing::{MemoryJobStore, StaticEventFeed, StoreCall};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
}

fn run(id: &str, block: &str, date: &str) -> JobRecord {
    let mut r = JobRecord::new(RunId::new(id).unwrap(), SourceKey::new(block).unwrap(), date);
    r.status = JobStatus::InProcess;
    r
}

fn pack(block: &str, batch: &str) -> RawCompletionEvent {
    RawCompletionEvent::new(
        None,
        json!({ "BatchId": batch, "UserData": { "Famous": { "GrowerBlockId": block } } }),
    )
}

fn rid(id: &str) -> RunId {
    RunId::new(id).unwrap()
}

fn engine(store: &Arc<MemoryJobStore>, feed: &Arc<StaticEventFeed>) -> Arc<ReconciliationEngine> {
    Arc::new(
        ReconciliationEngine::new(store.clone(), feed.clone(), ReconcilerConfig::default())
            .with_clock(Arc::new(FixedClock(today()))),
    )
}

#[tokio::test]
async fn duplicate_events_issue_one_patch() {
    let store = Arc::new(MemoryJobStore::with_records([run("r1", "BLOCK7", "2024-06-10")]));
    let feed = Arc::new(StaticEventFeed::new(vec![
        pack("BLOCK7", "BATCH99"),
        pack("BLOCK7", "BATCH99"),
    ]));

    let report = engine(&store, &feed).tick().await.unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(store.patches().len(), 1);
    assert_eq!(
        store.record(&rid("r1")).unwrap().external_tag,
        Some(ExternalTag::new("BATCH99").unwrap())
    );
}

#[tokio::test]
async fn malformed_event_does_not_block_batch() {
    let store = Arc::new(MemoryJobStore::with_records([
        run("r1", "B1", "2024-06-10"),
        run("r2", "B2", "2024-06-10"),
    ]));
    let feed = Arc::new(StaticEventFeed::new(vec![
        pack("B1", "T1"),
        RawCompletionEvent::new(None, Value::String("not json".to_string())),
        pack("B2", "T2"),
    ]));

    let report = engine(&store, &feed).tick().await.unwrap();

    assert_eq!(report.applied, 2);
    assert_eq!(report.parse_failures, 1);
    assert_eq!(report.events, 3);
}

#[tokio::test]
async fn second_tick_is_a_no_op() {
    let store = Arc::new(MemoryJobStore::with_records([run("r1", "B1", "2024-06-10")]));
    let feed = Arc::new(StaticEventFeed::new(vec![pack("B1", "T1")]));
    let engine = engine(&store, &feed);

    assert_eq!(engine.tick().await.unwrap().applied, 1);
    let second = engine.tick().await.unwrap();

    assert_eq!(second.applied, 0);
    assert_eq!(second.candidates, 0);
    assert_eq!(store.patches().len(), 1);
}

#[tokio::test]
async fn only_todays_runs_are_considered() {
    let store = Arc::new(MemoryJobStore::with_records([
        run("yesterday", "B1", "2024-06-09"),
        run("today", "B1", "2024-06-10"),
    ]));
    let feed = Arc::new(StaticEventFeed::new(vec![pack("B1", "T1")]));

    let report = engine(&store, &feed).tick().await.unwrap();

    assert_eq!(report.candidates, 1);
    assert_eq!(store.patches()[0].0, rid("today"));
    assert!(store.record(&rid("yesterday")).unwrap().external_tag.is_none());
}

#[tokio::test]
async fn failed_patch_is_isolated_and_retried() {
    let store = Arc::new(MemoryJobStore::with_records([
        run("flaky", "B1", "2024-06-10"),
        run("fine", "B2", "2024-06-10"),
    ]));
    store.fail_patch_for(rid("flaky"));
    let feed = Arc::new(StaticEventFeed::new(vec![pack("B1", "T1"), pack("B2", "T2")]));
    let engine = engine(&store, &feed);

    let first = engine.tick().await.unwrap();
    assert_eq!((first.applied, first.failed), (1, 1));
    assert!(store.record(&rid("fine")).unwrap().external_tag.is_some());

    store.clear_calls();
    let second = engine.tick().await.unwrap();
    assert_eq!((second.applied, second.failed), (0, 1));
    let retried: Vec<_> = store.patches().into_iter().map(|(id, _)| id).collect();
    assert_eq!(retried, vec![rid("flaky")]);
}

#[tokio::test]
async fn store_failure_aborts_without_writes() {
    let store = Arc::new(MemoryJobStore::with_records([run("r1", "B1", "2024-06-10")]));
    store.fail_list(true);
    let feed = Arc::new(StaticEventFeed::new(vec![pack("B1", "T1")]));

    let err = engine(&store, &feed).tick().await.unwrap_err();

    assert!(matches!(err, ReconcileError::Store(_)));
    assert!(store.patches().is_empty());
}

#[tokio::test]
async fn feed_failure_aborts_without_writes() {
    let store = Arc::new(MemoryJobStore::with_records([run("r1", "B1", "2024-06-10")]));
    let feed = Arc::new(StaticEventFeed::new(vec![pack("B1", "T1")]));
    feed.fail(true);

    let err = engine(&store, &feed).tick().await.unwrap_err();

    assert!(matches!(err, ReconcileError::Feed(_)));
    assert!(store.patches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn overlapping_tick_is_skipped() {
    let store = Arc::new(MemoryJobStore::with_records([run("r1", "B1", "2024-06-10")]));
    let feed = Arc::new(StaticEventFeed::new(vec![pack("B1", "T1")]));
    feed.delay(Duration::from_secs(10));
    let engine = engine(&store, &feed);

    let background = Arc::clone(&engine);
    let first = tokio::spawn(async move { background.tick().await });
    tokio::task::yield_now().await;
    assert!(engine.is_ticking());

    let overlap = engine.tick().await;
    assert!(matches!(overlap, Err(ReconcileError::TickInProgress)));

    let report = first.await.unwrap().unwrap();
    assert_eq!(report.applied, 1);
    assert!(!engine.is_ticking());
    assert_eq!(feed.polls(), 1);
}

#[tokio::test(start_paused = true)]
async fn loop_ticks_immediately_then_on_interval() {
    let store = Arc::new(MemoryJobStore::new());
    let feed = Arc::new(StaticEventFeed::new(Vec::new()));
    let engine = engine(&store, &feed);

    engine.start();
    engine.start();
    assert!(engine.is_started());

    // Fires at 0s, 60s and 120s.
    tokio::time::sleep(Duration::from_secs(150)).await;
    assert_eq!(feed.polls(), 3);

    engine.stop().await;
    assert!(!engine.is_started());

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(feed.polls(), 3);
    let lists = store
        .calls()
        .into_iter()
        .filter(|c| matches!(c, StoreCall::List(_)))
        .count();
    assert_eq!(lists, 3);
}

#[tokio::test(start_paused = true)]
async fn stop_lets_in_flight_tick_finish() {
    let store = Arc::new(MemoryJobStore::with_records([run("r1", "B1", "2024-06-10")]));
    let feed = Arc::new(StaticEventFeed::new(vec![pack("B1", "T1")]));
    feed.delay(Duration::from_secs(30));
    let engine = engine(&store, &feed);

    engine.start();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(engine.is_ticking());

    engine.stop().await;

    assert_eq!(feed.polls(), 1);
    assert!(store.record(&rid("r1")).unwrap().external_tag.is_some());
}
