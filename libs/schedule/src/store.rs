//! Run store interface.

use async_trait::async_trait;
use shed_id::RunId;

use crate::{DateRange, JobPayload, JobRecord, PatchFields, PositionUpdate, StoreError};

/// The remote store that owns run records.
///
/// Every call may fail. Calls are addressed by durable id and are safe to
/// retry.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Runs dated within `range`.
    async fn list(&self, range: DateRange) -> Result<Vec<JobRecord>, StoreError>;

    /// Creates a run and returns it with its durable id.
    async fn create(&self, payload: &JobPayload) -> Result<JobRecord, StoreError>;

    /// Applies a partial update.
    async fn patch(&self, id: &RunId, fields: &PatchFields) -> Result<JobRecord, StoreError>;

    async fn delete(&self, id: &RunId) -> Result<(), StoreError>;

    /// Writes many positions at once.
    async fn reorder(&self, batch: &[PositionUpdate]) -> Result<(), StoreError>;
}
