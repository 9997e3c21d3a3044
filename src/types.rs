//! Shared data-model types.
//!
//! An [`Item`] is the unit of work the queue buffers: a compaction key, an
//! opaque payload, and an optional identity used for content-based
//! deduplication.

use serde::{Deserialize, Serialize};

/// A unit of work buffered by the queue.
///
/// The `key` names the compaction slot: enqueueing a second item for the same
/// key replaces the buffered payload (last write wins) without producing a
/// second dequeue. The optional `unique_id` identifies the payload's content;
/// when set, re-enqueueing the same `(key, unique_id)` pair within the
/// configured deduplication window is suppressed entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Compaction key. Must be non-empty.
    pub key: String,

    /// Opaque payload bytes. May be empty.
    pub payload: Vec<u8>,

    /// Optional content identity for deduplication.
    ///
    /// `None` (or an empty string) disables deduplication for this enqueue.
    pub unique_id: Option<String>,
}

impl Item {
    /// Creates an item with no deduplication identity.
    pub fn new(key: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Item {
            key: key.into(),
            payload: payload.into(),
            unique_id: None,
        }
    }

    /// Attaches a deduplication identity to the item.
    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }
}
