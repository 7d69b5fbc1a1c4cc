//! HTTP clients for the run store and the completion feed.
//!
//! Both speak JSON to the shed backend:
//! - `production-runs/` for run CRUD and bulk reorder
//! - `packs-completed/` for recent completion events

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde_json::Value;
use shed_events::{EventError, EventFeed, RawCompletionEvent};
use shed_id::RunId;
use shed_schedule::{
    DateRange, JobPayload, JobRecord, JobStore, PatchFields, PositionUpdate, StoreError,
};
use tracing::{debug, error, warn};

/// Builds the HTTP client shared by the store and the feed.
pub fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(client)
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

/// Run store backed by the `production-runs` REST resource.
#[derive(Clone)]
pub struct HttpJobStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpJobStore {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        join(&self.base_url, path)
    }

    fn run_url(&self, id: &RunId) -> String {
        self.url(&format!("production-runs/{id}/"))
    }

    /// Turns a non-success response into a [`StoreError`].
    async fn check(response: Response, action: &str, id: Option<&RunId>) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = id {
                return Err(StoreError::NotFound(id.clone()));
            }
        }

        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, "Failed to {}", action);
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

fn transport(err: reqwest::Error) -> StoreError {
    StoreError::Transport(err.to_string())
}

fn decode(err: reqwest::Error) -> StoreError {
    StoreError::Decode(err.to_string())
}

#[async_trait]
impl JobStore for HttpJobStore {
    async fn list(&self, range: DateRange) -> Result<Vec<JobRecord>, StoreError> {
        let url = self.url("production-runs/");
        debug!(url = %url, start = %range.start, end = %range.end, "Listing runs");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("start", range.start.to_string()),
                ("end", range.end.to_string()),
            ])
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check(response, "list runs", None).await?;

        let rows: Vec<Value> = response.json().await.map_err(decode)?;

        // One unreadable row must not hide the rest of the range.
        let mut records = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;
        for row in rows {
            let id = row.get("id").cloned().unwrap_or(Value::Null);
            match serde_json::from_value::<JobRecord>(row) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(id = %id, error = %e, "Skipping unreadable run");
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            warn!(skipped, kept = records.len(), "Listed runs with unreadable rows");
        } else {
            debug!(count = records.len(), "Listed runs");
        }
        Ok(records)
    }

    async fn create(&self, payload: &JobPayload) -> Result<JobRecord, StoreError> {
        let url = self.url("production-runs/");
        debug!(source_key = %payload.source_key, date = %payload.date, "Creating run");

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check(response, "create run", None).await?;

        response.json().await.map_err(decode)
    }

    async fn patch(&self, id: &RunId, fields: &PatchFields) -> Result<JobRecord, StoreError> {
        let response = self
            .client
            .patch(self.run_url(id))
            .json(fields)
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check(response, "patch run", Some(id)).await?;

        response.json().await.map_err(decode)
    }

    async fn delete(&self, id: &RunId) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.run_url(id))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response, "delete run", Some(id)).await?;
        Ok(())
    }

    async fn reorder(&self, batch: &[PositionUpdate]) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(self.url("production-runs/reorder/"))
            .json(batch)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response, "reorder runs", None).await?;
        Ok(())
    }
}

/// Completion feed backed by the `packs-completed` resource.
#[derive(Clone)]
pub struct HttpEventFeed {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEventFeed {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl EventFeed for HttpEventFeed {
    async fn recent(&self) -> Result<Vec<RawCompletionEvent>, EventError> {
        let url = join(&self.base_url, "packs-completed/");
        debug!(url = %url, "Fetching completion events");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EventError::Feed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Failed to fetch completion events");
            return Err(EventError::Feed(format!("{status} - {body}")));
        }

        let items: Vec<Value> = response
            .json()
            .await
            .map_err(|e| EventError::Feed(e.to_string()))?;

        // A record with an unreadable envelope is dropped on its own.
        let mut events = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<RawCompletionEvent>(item) {
                Ok(event) => events.push(event),
                Err(e) => warn!(error = %e, "Dropping unreadable completion record"),
            }
        }

        debug!(count = events.len(), "Fetched completion events");
        Ok(events)
    }
}
