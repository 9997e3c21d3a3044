//! Keyed delay queue with last-write-wins compaction.
//!
//! `delayq` sits between a producer and a downstream processor to buffer
//! items for a configured delay, collapse multiple updates to the same key
//! into a single release carrying the latest payload, and optionally
//! suppress re-enqueues of identical content within a deduplication window.
//! State lives in a durable key-value store ([`store::RedbStore`] on disk,
//! [`store::MemoryStore`] for tests) fronted by an in-memory score-ordered
//! index, so a queue survives process restarts.
//!
//! ```
//! use std::time::Duration;
//!
//! use delayq::{DelayQueue, Item};
//! use delayq::store::MemoryStore;
//!
//! // A zero buffer makes items eligible immediately; real deployments pass
//! // the delay they want to compact over.
//! let queue = DelayQueue::new(MemoryStore::new(), Duration::ZERO)?;
//!
//! queue.enqueue(&Item::new("sensor-7", b"reading 1".to_vec()))?;
//! queue.enqueue(&Item::new("sensor-7", b"reading 2".to_vec()))?;
//!
//! // Both updates collapse into one item with the latest payload.
//! let released = queue.dequeue(10)?;
//! assert_eq!(released.len(), 1);
//! assert_eq!(released[0].payload, b"reading 2");
//! # Ok::<(), delayq::QueueError>(())
//! ```

mod clock;
pub mod codec;
pub mod queue;
pub mod scored_set;
pub mod store;
pub mod types;

pub use queue::{DEDUPE_PREFIX, DelayQueue, QueueError, QueueOptions};
pub use scored_set::ScoredSet;
pub use store::{StoreError, ValueStore};
pub use types::Item;
