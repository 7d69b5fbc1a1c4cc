//! Event feed interface.

use async_trait::async_trait;

use crate::{EventError, RawCompletionEvent};

/// Source of recently completed packs.
#[async_trait]
pub trait EventFeed: Send + Sync {
    /// Returns the most recent batch of completion events.
    ///
    /// Repeated calls may return events already seen.
    async fn recent(&self) -> Result<Vec<RawCompletionEvent>, EventError>;
}
