//! In-memory run store.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;
use shed_id::{JobId, RunId};
use shed_schedule::{
    DateRange, JobPayload, JobRecord, JobStore, PatchFields, PositionUpdate, StoreError,
};

/// A call received by [`MemoryJobStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    List(DateRange),
    Create(JobPayload),
    Patch(RunId, PatchFields),
    Delete(RunId),
    Reorder(Vec<PositionUpdate>),
}

#[derive(Default)]
struct Inner {
    records: Vec<JobRecord>,
    calls: Vec<StoreCall>,
    next_id: u64,
    fail_list: bool,
    fail_writes: bool,
    fail_reorder: bool,
    fail_patch: HashSet<RunId>,
}

/// Run store backed by a vector.
///
/// `list` returns records whose date starts with a `YYYY-MM-DD` inside the
/// range, plus every record whose date cannot be read that way, so tests
/// can feed malformed dates through the normal load path.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = JobRecord>) -> Self {
        let store = Self::new();
        store.lock().records.extend(records);
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }

    /// Makes every `list` call fail.
    pub fn fail_list(&self, fail: bool) {
        self.lock().fail_list = fail;
    }

    /// Makes every create, patch, delete, and reorder fail.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Makes every reorder fail while other writes succeed.
    pub fn fail_reorder(&self, fail: bool) {
        self.lock().fail_reorder = fail;
    }

    /// Makes patches of one run fail.
    pub fn fail_patch_for(&self, id: RunId) {
        self.lock().fail_patch.insert(id);
    }

    pub fn records(&self) -> Vec<JobRecord> {
        self.lock().records.clone()
    }

    pub fn record(&self, id: &RunId) -> Option<JobRecord> {
        self.lock()
            .records
            .iter()
            .find(|r| r.id.durable() == Some(id))
            .cloned()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Patches received, in order.
    pub fn patches(&self) -> Vec<(RunId, PatchFields)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                StoreCall::Patch(id, fields) => Some((id.clone(), fields.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

fn stored_date(record: &JobRecord) -> Option<NaiveDate> {
    let raw = record.date.as_deref()?;
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

fn unavailable() -> StoreError {
    StoreError::Status {
        status: 503,
        body: "store unavailable".to_string(),
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn list(&self, range: DateRange) -> Result<Vec<JobRecord>, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::List(range));
        if inner.fail_list {
            return Err(unavailable());
        }
        Ok(inner
            .records
            .iter()
            .filter(|r| stored_date(r).is_none_or(|d| range.contains(d)))
            .cloned()
            .collect())
    }

    async fn create(&self, payload: &JobPayload) -> Result<JobRecord, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::Create(payload.clone()));
        if inner.fail_writes {
            return Err(unavailable());
        }

        inner.next_id += 1;
        let id = RunId::new(format!("run-{}", inner.next_id))
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        let mut record = JobRecord::new(
            id,
            payload.source_key.clone(),
            payload.date.format("%Y-%m-%d").to_string(),
        );
        record.position = Some(payload.position);
        record.status = payload.status;
        record.quantity = payload.quantity;
        record.notes = payload.notes.clone();
        record.location = payload.location.clone();
        record.pool_ref = payload.pool_ref.clone();

        inner.records.push(record.clone());
        Ok(record)
    }

    async fn patch(&self, id: &RunId, fields: &PatchFields) -> Result<JobRecord, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::Patch(id.clone(), fields.clone()));
        if inner.fail_writes || inner.fail_patch.contains(id) {
            return Err(unavailable());
        }

        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id.durable() == Some(id))
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if let Some(date) = fields.date {
            record.date = Some(date.format("%Y-%m-%d").to_string());
        }
        if let Some(position) = fields.position {
            record.position = Some(position);
        }
        if let Some(status) = fields.status {
            record.status = status;
        }
        if let Some(tag) = &fields.external_tag {
            record.external_tag = Some(tag.clone());
        }
        if fields.time_started.is_some() {
            record.time_started = fields.time_started;
        }
        if fields.time_completed.is_some() {
            record.time_completed = fields.time_completed;
        }
        Ok(record.clone())
    }

    async fn delete(&self, id: &RunId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::Delete(id.clone()));
        if inner.fail_writes {
            return Err(unavailable());
        }
        let before = inner.records.len();
        let target = JobId::Durable(id.clone());
        inner.records.retain(|r| r.id != target);
        if inner.records.len() == before {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn reorder(&self, batch: &[PositionUpdate]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::Reorder(batch.to_vec()));
        if inner.fail_writes || inner.fail_reorder {
            return Err(unavailable());
        }
        for update in batch {
            if let Some(record) = inner
                .records
                .iter_mut()
                .find(|r| r.id.durable() == Some(&update.id))
            {
                record.position = Some(update.position);
            }
        }
        Ok(())
    }
}
