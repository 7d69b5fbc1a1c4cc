//! Run records and the in-memory job model.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::IntoDeserializer;
use serde::{Deserialize, Deserializer, Serialize};
use shed_id::{ExternalTag, JobId, RunId, SourceKey};

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum JobStatus {
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "In process", alias = "In Process")]
    InProcess,
    #[serde(rename = "Hold")]
    Hold,
    #[serde(rename = "Complete")]
    Complete,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::NotStarted => "not_started",
            JobStatus::InProcess => "in_process",
            JobStatus::Hold => "hold",
            JobStatus::Complete => "complete",
        };
        write!(f, "{}", s)
    }
}

/// A run as the store holds it.
///
/// The date is whatever string the store has; it may be malformed or
/// skewed, and is only trusted after normalization.
///
/// Reads accept the store's nested `grower_block` object as well as a flat
/// `grower_block_id`. Writes always use the flat key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredRun")]
pub struct JobRecord {
    pub id: JobId,

    #[serde(rename = "grower_block_id")]
    pub source_key: SourceKey,

    #[serde(rename = "run_date")]
    pub date: Option<String>,

    #[serde(rename = "row_order")]
    pub position: Option<u32>,

    #[serde(rename = "run_status")]
    pub status: JobStatus,

    #[serde(rename = "bins")]
    pub quantity: u32,

    pub notes: Option<String>,

    pub location: Option<String>,

    #[serde(rename = "pool")]
    pub pool_ref: Option<String>,

    #[serde(rename = "batch_id")]
    pub external_tag: Option<ExternalTag>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_started: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_completed: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Creates a bare record in `NotStarted` with no payload.
    pub fn new(id: impl Into<JobId>, source_key: SourceKey, date: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_key,
            date: Some(date.into()),
            position: None,
            status: JobStatus::NotStarted,
            quantity: 0,
            notes: None,
            location: None,
            pool_ref: None,
            external_tag: None,
            time_started: None,
            time_completed: None,
        }
    }

    /// Returns true if reconciliation may attach a tag to this run.
    pub fn awaits_tag(&self) -> bool {
        self.status == JobStatus::InProcess && self.external_tag.is_none()
    }
}

/// A run row exactly as the store returns it.
#[derive(Deserialize)]
struct StoredRun {
    id: JobId,
    #[serde(default)]
    grower_block: Option<BlockRef>,
    #[serde(default)]
    grower_block_id: Option<SourceKey>,
    #[serde(rename = "grower_block.block_id", default)]
    flattened_block_id: Option<SourceKey>,
    #[serde(default)]
    run_date: Option<String>,
    #[serde(default)]
    row_order: Option<i64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    run_status: Option<String>,
    #[serde(default)]
    bins: Option<i64>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    pool: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    batch_id: Option<String>,
    #[serde(default)]
    time_started: Option<DateTime<Utc>>,
    #[serde(default)]
    time_completed: Option<DateTime<Utc>>,
}

/// The block a run belongs to: the nested object or its bare key.
#[derive(Deserialize)]
#[serde(untagged)]
enum BlockRef {
    Nested { block_id: SourceKey },
    Key(SourceKey),
}

impl BlockRef {
    fn into_key(self) -> SourceKey {
        match self {
            BlockRef::Nested { block_id } => block_id,
            BlockRef::Key(key) => key,
        }
    }
}

impl TryFrom<StoredRun> for JobRecord {
    type Error = String;

    fn try_from(row: StoredRun) -> Result<Self, Self::Error> {
        let source_key = row
            .grower_block
            .map(BlockRef::into_key)
            .or(row.grower_block_id)
            .or(row.flattened_block_id)
            .ok_or_else(|| format!("run {} has no grower block", row.id))?;

        let status = match row.run_status {
            Some(label) => JobStatus::deserialize(label.as_str().into_deserializer())
                .map_err(|e: serde::de::value::Error| format!("run {}: {e}", row.id))?,
            None => JobStatus::default(),
        };

        let external_tag = row
            .batch_id
            .map(ExternalTag::new)
            .transpose()
            .map_err(|e| format!("run {}: {e}", row.id))?;

        Ok(Self {
            id: row.id,
            source_key,
            date: row.run_date,
            // A negative order is as good as none.
            position: row.row_order.and_then(|p| u32::try_from(p).ok()),
            status,
            quantity: row.bins.and_then(|b| u32::try_from(b).ok()).unwrap_or(0),
            notes: row.notes,
            location: row.location,
            pool_ref: row.pool,
            external_tag,
            time_started: row.time_started,
            time_completed: row.time_completed,
        })
    }
}

/// A text or numeric scalar.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(i64),
}

/// Reads an optional scalar as text, treating blank strings as absent.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        Some(Scalar::Text(s)) if s.trim().is_empty() => None,
        Some(Scalar::Text(s)) => Some(s.trim().to_string()),
        Some(Scalar::Number(n)) => Some(n.to_string()),
        None => None,
    })
}

/// Fields a user supplies for a new run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDraft {
    pub source_key: SourceKey,
    pub quantity: u32,
    pub notes: Option<String>,
    pub location: Option<String>,
    pub pool_ref: Option<String>,
}

impl JobDraft {
    pub fn new(source_key: SourceKey) -> Self {
        Self {
            source_key,
            quantity: 0,
            notes: None,
            location: None,
            pool_ref: None,
        }
    }
}

/// A run placed on a canonical day at a concrete position.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub source_key: SourceKey,
    pub date: NaiveDate,
    pub position: u32,
    pub status: JobStatus,
    pub quantity: u32,
    pub notes: Option<String>,
    pub location: Option<String>,
    pub pool_ref: Option<String>,
    pub external_tag: Option<ExternalTag>,
    pub status_timestamps: BTreeMap<JobStatus, DateTime<Utc>>,
}

impl Job {
    /// Places a stored record on `date` at `position`.
    pub fn from_record(record: JobRecord, date: NaiveDate, position: u32) -> Self {
        let mut status_timestamps = BTreeMap::new();
        if let Some(at) = record.time_started {
            status_timestamps.insert(JobStatus::InProcess, at);
        }
        if let Some(at) = record.time_completed {
            status_timestamps.insert(JobStatus::Complete, at);
        }

        Self {
            id: record.id,
            source_key: record.source_key,
            date,
            position,
            status: record.status,
            quantity: record.quantity,
            notes: record.notes,
            location: record.location,
            pool_ref: record.pool_ref,
            external_tag: record.external_tag,
            status_timestamps,
        }
    }

    /// Creates an unsaved run from a draft.
    pub fn from_draft(id: JobId, draft: JobDraft, date: NaiveDate, position: u32) -> Self {
        Self {
            id,
            source_key: draft.source_key,
            date,
            position,
            status: JobStatus::NotStarted,
            quantity: draft.quantity,
            notes: draft.notes,
            location: draft.location,
            pool_ref: draft.pool_ref,
            external_tag: None,
            status_timestamps: BTreeMap::new(),
        }
    }

    /// Moves the run into `status`, recording when it was entered.
    ///
    /// The entry instant for a status is written once; re-entering a status
    /// keeps the first instant. Returns false if the status is unchanged.
    pub fn set_status(&mut self, status: JobStatus, at: DateTime<Utc>) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        self.status_timestamps.entry(status).or_insert(at);
        true
    }

    /// When the run entered `status`, if it has.
    pub fn entered_at(&self, status: JobStatus) -> Option<DateTime<Utc>> {
        self.status_timestamps.get(&status).copied()
    }

    pub fn to_record(&self) -> JobRecord {
        JobRecord {
            id: self.id.clone(),
            source_key: self.source_key.clone(),
            date: Some(self.date.format("%Y-%m-%d").to_string()),
            position: Some(self.position),
            status: self.status,
            quantity: self.quantity,
            notes: self.notes.clone(),
            location: self.location.clone(),
            pool_ref: self.pool_ref.clone(),
            external_tag: self.external_tag.clone(),
            time_started: self.entered_at(JobStatus::InProcess),
            time_completed: self.entered_at(JobStatus::Complete),
        }
    }

    /// The creation payload for this run. Ids and tags are store-owned.
    pub fn to_payload(&self) -> JobPayload {
        JobPayload {
            source_key: self.source_key.clone(),
            date: self.date,
            position: self.position,
            status: self.status,
            quantity: self.quantity,
            notes: self.notes.clone(),
            location: self.location.clone(),
            pool_ref: self.pool_ref.clone(),
        }
    }
}

/// Body of a create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobPayload {
    #[serde(rename = "grower_block_id")]
    pub source_key: SourceKey,
    #[serde(rename = "run_date")]
    pub date: NaiveDate,
    #[serde(rename = "row_order")]
    pub position: u32,
    #[serde(rename = "run_status")]
    pub status: JobStatus,
    #[serde(rename = "bins")]
    pub quantity: u32,
    pub notes: Option<String>,
    pub location: Option<String>,
    #[serde(rename = "pool")]
    pub pool_ref: Option<String>,
}

/// A partial update; absent fields are left untouched by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchFields {
    #[serde(rename = "run_date", skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,

    #[serde(rename = "row_order", skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,

    #[serde(rename = "run_status", skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,

    #[serde(rename = "batch_id", skip_serializing_if = "Option::is_none")]
    pub external_tag: Option<ExternalTag>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_started: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_completed: Option<DateTime<Utc>>,
}

impl PatchFields {
    /// Moves a run to `date` at `position`.
    pub fn placement(date: NaiveDate, position: u32) -> Self {
        Self {
            date: Some(date),
            position: Some(position),
            ..Default::default()
        }
    }

    /// Attaches a batch tag.
    pub fn tag(tag: ExternalTag) -> Self {
        Self {
            external_tag: Some(tag),
            ..Default::default()
        }
    }

    /// Records a status transition and its entry instant.
    pub fn status(job: &Job) -> Self {
        let mut fields = Self {
            status: Some(job.status),
            ..Default::default()
        };
        match job.status {
            JobStatus::InProcess => fields.time_started = job.entered_at(JobStatus::InProcess),
            JobStatus::Complete => fields.time_completed = job.entered_at(JobStatus::Complete),
            JobStatus::NotStarted | JobStatus::Hold => {}
        }
        fields
    }
}

/// One entry of a bulk reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: RunId,
    #[serde(rename = "row_order")]
    pub position: u32,
}
