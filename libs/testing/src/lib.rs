//! # shed-testing
//!
//! In-memory stand-ins for the run store and the completion feed.
//!
//! Both record every call they receive and can be told to fail, so tests
//! can assert on exactly what was sent and exercise partial-failure paths.

mod feed;
mod store;

pub use feed::StaticEventFeed;
pub use store::{MemoryJobStore, StoreCall};
