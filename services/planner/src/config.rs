//! Configuration for the planner.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use shed_reconcile::ReconcilerConfig;

/// Planner configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Run store API base URL.
    pub api_url: String,

    /// Completion feed base URL.
    pub feed_url: String,

    /// Seconds between reconciliation ticks.
    pub sync_interval_secs: u64,

    /// HTTP request timeout in seconds.
    pub http_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// First day of the week to load. Defaults to the current week.
    pub week_start: Option<NaiveDate>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = var("SHED_API_URL").unwrap_or_else(|| "http://127.0.0.1:8000/api".to_string());

        let feed_url = var("SHED_FEED_URL").unwrap_or_else(|| api_url.clone());

        let sync_interval_secs = var("SHED_SYNC_INTERVAL_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(60);

        let http_timeout_secs = var("SHED_HTTP_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let log_level = var("SHED_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let week_start = var("SHED_WEEK_START")
            .map(|s| {
                NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .with_context(|| format!("SHED_WEEK_START is not a YYYY-MM-DD date: {s}"))
            })
            .transpose()?;

        Ok(Self {
            api_url,
            feed_url,
            sync_interval_secs,
            http_timeout_secs,
            log_level,
            week_start,
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn reconciler(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            interval: Duration::from_secs(self.sync_interval_secs),
        }
    }
}
