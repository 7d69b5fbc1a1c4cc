//! Weekly production planner.
//!
//! Wires the scheduling core to the run store's REST API and runs the
//! batch-tag reconciliation engine in the background.
//!
//! ## Modules
//!
//! - `client`: HTTP implementations of the run store and completion feed
//! - `config`: Environment configuration
//! - `controller`: Persisting wrapper around the scheduler

pub mod client;
pub mod config;
pub mod controller;

pub use client::{HttpEventFeed, HttpJobStore};
pub use config::Config;
pub use controller::{CalendarController, ControllerError};
