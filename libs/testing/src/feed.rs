//! Scripted completion feed.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use shed_events::{EventError, EventFeed, RawCompletionEvent};

/// Event feed that returns the same batch on every poll, as the real feed
/// does until newer packs push old ones out.
#[derive(Default)]
pub struct StaticEventFeed {
    events: Mutex<Vec<RawCompletionEvent>>,
    fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
    polls: AtomicUsize,
}

impl StaticEventFeed {
    pub fn new(events: Vec<RawCompletionEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            ..Default::default()
        }
    }

    pub fn set_events(&self, events: Vec<RawCompletionEvent>) {
        *self.events.lock().expect("feed lock poisoned") = events;
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Holds every poll open for `delay` before answering.
    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().expect("feed lock poisoned") = Some(delay);
    }

    /// Number of `recent` calls so far.
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventFeed for StaticEventFeed {
    async fn recent(&self) -> Result<Vec<RawCompletionEvent>, EventError> {
        self.polls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().expect("feed lock poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(EventError::Feed("feed unavailable".to_string()));
        }
        Ok(self.events.lock().expect("feed lock poisoned").clone())
    }
}
