//! Completion event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shed_id::{ExternalTag, SourceKey};

use crate::EventError;

/// A completion event as the feed returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCompletionEvent {
    /// Batch tag, when the feed surfaces it at the top level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,

    /// When the pack completed.
    #[serde(default, alias = "created", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Opaque payload: a JSON object, or a string holding one.
    #[serde(default)]
    pub payload: Value,
}

/// A completion event reduced to the fields reconciliation joins on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCompletionEvent {
    pub source_key: SourceKey,
    pub external_tag: ExternalTag,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawCompletionEvent {
    /// Creates an event from an already-decoded payload.
    pub fn new(timestamp: Option<DateTime<Utc>>, payload: Value) -> Self {
        Self {
            batch: None,
            timestamp,
            payload,
        }
    }

    /// Sets the top-level batch tag.
    pub fn with_batch(mut self, batch: impl Into<String>) -> Self {
        self.batch = Some(batch.into());
        self
    }

    /// Decodes the payload, unwrapping string-encoded JSON.
    pub fn decode_payload(&self) -> Result<Value, EventError> {
        match &self.payload {
            Value::String(s) => Ok(serde_json::from_str(s)?),
            Value::Object(_) => Ok(self.payload.clone()),
            Value::Null => Ok(Value::Object(Default::default())),
            other => Err(EventError::MalformedPayload(format!(
                "expected an object, got {}",
                json_kind(other)
            ))),
        }
    }

    /// Extracts the source key and batch tag.
    ///
    /// The tag is taken from the top-level `batch` field, falling back to
    /// `payload.BatchId`. The source key is
    /// `payload.UserData.Famous.GrowerBlockId`.
    pub fn parse(&self) -> Result<ExternalCompletionEvent, EventError> {
        let payload = self.decode_payload()?;

        let external_tag = self
            .batch
            .as_deref()
            .and_then(|b| ExternalTag::new(b).ok())
            .or_else(|| scalar_at(&payload, &["BatchId"]).and_then(|s| ExternalTag::new(s).ok()))
            .ok_or(EventError::MissingTag)?;

        let source_key = scalar_at(&payload, &["UserData", "Famous", "GrowerBlockId"])
            .and_then(|s| SourceKey::new(s).ok())
            .ok_or_else(|| EventError::MissingSourceKey {
                tag: external_tag.to_string(),
            })?;

        Ok(ExternalCompletionEvent {
            source_key,
            external_tag,
            timestamp: self.timestamp,
        })
    }
}

/// Reads a string or number at `path`, rendering numbers as text.
fn scalar_at(value: &Value, path: &[&str]) -> Option<String> {
    let leaf = path.iter().try_fold(value, |v, key| v.get(key))?;
    match leaf {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
