//! shed planner
//!
//! Loads the configured production week from the run store and keeps
//! in-process runs tagged with their packing batch until shut down.
//!
//! ## Architecture
//!
//! - **Controller**: Groups the week's runs by day and persists edits
//! - **Reconciliation Engine**: Polls completed packs and tags matching runs
//! - **HTTP clients**: The run store and completion feed over REST

use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use shed_planner::client::{http_client, HttpEventFeed, HttpJobStore};
use shed_planner::{CalendarController, Config};
use shed_reconcile::ReconciliationEngine;
use shed_schedule::Week;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        api_url = %config.api_url,
        feed_url = %config.feed_url,
        sync_interval_secs = config.sync_interval_secs,
        "Starting shed planner"
    );

    let client = http_client(config.http_timeout())?;
    let store = Arc::new(HttpJobStore::new(client.clone(), config.api_url.clone()));
    let feed = Arc::new(HttpEventFeed::new(client, config.feed_url.clone()));

    let week = match config.week_start {
        Some(start) => Week::starting(start),
        None => Week::containing(Local::now().date_naive()),
    };
    let mut controller = CalendarController::new(store.clone(), week);
    match controller.load_week(week).await {
        Ok(report) => info!(
            week_start = %week.start(),
            direct = report.direct,
            weekday_fallback = report.weekday_fallback,
            reparsed = report.reparsed,
            unassigned = report.unassigned,
            "Week ready"
        ),
        Err(e) => warn!(error = %e, week_start = %week.start(), "Failed to load week"),
    }

    let engine = Arc::new(ReconciliationEngine::new(store, feed, config.reconciler()));
    engine.start();

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    engine.stop().await;

    info!("Shed planner shutdown complete");
    Ok(())
}
