//! Timer-driven reconciliation worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use shed_events::EventFeed;
use shed_schedule::{DateRange, JobStore, PatchFields};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::{plan_updates, ReconcileError, DEFAULT_SYNC_INTERVAL};

/// Source of "today" for the engine.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// The current UTC calendar date.
///
/// Run dates in the store are compared against this, whatever the host's
/// time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// A clock stuck on one date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Time between ticks.
    pub interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Runs eligible for a tag at the start of the tick.
    pub candidates: usize,
    /// Events in the fetched batch.
    pub events: usize,
    /// Patches that succeeded.
    pub applied: usize,
    /// Patches that failed and will be retried next tick.
    pub failed: usize,
    pub parse_failures: usize,
}

/// Clears the running flag when a tick ends, however it ends.
struct TickGuard<'a>(&'a AtomicBool);

impl<'a> TickGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Polls the completion feed and tags matching runs.
pub struct ReconciliationEngine {
    store: Arc<dyn JobStore>,
    feed: Arc<dyn EventFeed>,
    clock: Arc<dyn Clock>,
    config: ReconcilerConfig,
    running: AtomicBool,
    worker: Mutex<Option<Worker>>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn JobStore>, feed: Arc<dyn EventFeed>, config: ReconcilerConfig) -> Self {
        Self {
            store,
            feed,
            clock: Arc::new(SystemClock),
            config,
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Whether a tick is executing right now.
    pub fn is_ticking(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether the background loop has been started and not stopped.
    pub fn is_started(&self) -> bool {
        self.worker_slot().is_some()
    }

    fn worker_slot(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs one reconciliation pass.
    ///
    /// Both snapshots are fetched before anything is written; if either
    /// fetch fails the tick ends with no writes. Each patch then succeeds or
    /// fails on its own.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<TickReport, ReconcileError> {
        let Some(_guard) = TickGuard::acquire(&self.running) else {
            debug!("Reconciliation tick already in progress, skipping");
            return Err(ReconcileError::TickInProgress);
        };

        let today = self.clock.today();
        let jobs = self.store.list(DateRange::day(today)).await.map_err(|e| {
            warn!(error = %e, date = %today, "Failed to load runs for reconciliation");
            ReconcileError::from(e)
        })?;
        let events = self.feed.recent().await.map_err(|e| {
            warn!(error = %e, "Failed to read completion feed");
            ReconcileError::from(e)
        })?;

        let plan = plan_updates(&jobs, &events);
        let mut report = TickReport {
            candidates: jobs.iter().filter(|j| j.awaits_tag()).count(),
            events: events.len(),
            parse_failures: plan.parse_failures,
            ..Default::default()
        };

        for update in plan.updates {
            let fields = PatchFields::tag(update.tag.clone());
            match self.store.patch(&update.run_id, &fields).await {
                Ok(_) => {
                    info!(
                        run_id = %update.run_id,
                        source_key = %update.source_key,
                        tag = %update.tag,
                        "Tagged run with batch"
                    );
                    report.applied += 1;
                }
                Err(e) => {
                    warn!(
                        run_id = %update.run_id,
                        tag = %update.tag,
                        error = %e,
                        "Failed to tag run, will retry next tick"
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Spawns the polling loop. The first tick runs immediately.
    ///
    /// Does nothing if the loop is already running.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.worker_slot();
        if slot.is_some() {
            debug!("Reconciliation engine already started");
            return;
        }

        let (shutdown, rx) = watch::channel(false);
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move { engine.run(rx).await });
        *slot = Some(Worker { shutdown, handle });
    }

    /// Stops the loop, letting an in-flight tick finish.
    pub async fn stop(&self) {
        let worker = self.worker_slot().take();
        let Some(worker) = worker else {
            return;
        };

        let _ = worker.shutdown.send(true);
        if let Err(e) = worker.handle.await {
            error!(error = %e, "Reconciliation loop ended abnormally");
        }
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting reconciliation engine"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Reconciliation engine shutting down");
                        break;
                    }
                }
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(report) if report.applied > 0 || report.failed > 0 => {
                            info!(
                                candidates = report.candidates,
                                events = report.events,
                                applied = report.applied,
                                failed = report.failed,
                                parse_failures = report.parse_failures,
                                "Reconciliation tick complete"
                            );
                        }
                        Ok(report) => {
                            debug!(
                                candidates = report.candidates,
                                events = report.events,
                                "Reconciliation tick found nothing to apply"
                            );
                        }
                        Err(ReconcileError::TickInProgress) => {}
                        Err(e) => error!(error = %e, "Reconciliation tick failed"),
                    }
                }
            }
        }
    }
}
