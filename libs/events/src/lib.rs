//! # shed-events
//!
//! Completion events reported by the packing line.
//!
//! ## Delivery model
//!
//! The feed returns a batch of recently completed packs on every poll. The
//! batch is unordered and may repeat events already seen on earlier polls;
//! there is no acknowledgement. Consumers deduplicate by the effect they
//! apply, not by event identity.
//!
//! ## Payloads
//!
//! Each raw event carries an opaque payload (a JSON object, or a string
//! containing one). [`RawCompletionEvent::parse`] extracts the two fields
//! reconciliation needs: the source block key and the batch tag.

mod error;
mod feed;
mod types;

pub use error::EventError;
pub use feed::EventFeed;
pub use types::*;
