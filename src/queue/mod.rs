//! The delay queue: compaction, deduplication, and release policy.
//!
//! A [`DelayQueue`] binds three pieces into one consistent abstraction:
//!
//! - the **delay index** (a [`ScoredSet`]) ordering buffered keys by the
//!   UNIX second at which they become eligible for release,
//! - the **value store** (a [`ValueStore`]) holding the latest payload per
//!   key, encoded with its release score,
//! - the **policy**: last-write-wins compaction per key, optional
//!   content-based deduplication, and a bounded-capacity overflow release.
//!
//! # Coordination
//!
//! A single mutex around the index is the coordination lock. Enqueue holds
//! it across the capacity check, the store transaction, and the index
//! upsert; dequeue holds it only while selecting (and atomically removing)
//! candidates, then performs the store reads and deletes in one transaction
//! outside the lock so consumers do not serialize on I/O. If that
//! transaction fails, every selected candidate is put back into the index
//! at its original score before the error is surfaced.
//!
//! # Release modes
//!
//! - **Time release**: entries whose deadline has arrived, in ascending
//!   `(score, key)` order.
//! - **Overflow release**: when the index has reached `max_items`, dequeue
//!   drains from the head of the queue regardless of deadlines to relieve
//!   pressure.
//!
//! # Recovery
//!
//! Construction scans the store and rebuilds the index from the score
//! suffix of every live entry, so a queue over a persistent store resumes
//! where the previous process left off.

use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use crate::clock::now_unix_seconds;
use crate::codec::{self, TruncatedValue};
use crate::scored_set::ScoredSet;
use crate::store::{StoreError, ValueStore};
use crate::types::Item;


/// Key prefix reserved for deduplication markers.
///
/// A marker for item key `k` is stored under `dedupe:k` in the same
/// keyspace as the entries themselves, so user keys must not start with
/// this prefix; [`DelayQueue::enqueue`] rejects ones that do.
pub const DEDUPE_PREFIX: &str = "dedupe:";

/// Tuning knobs for a [`DelayQueue`]. The defaults disable all of them.
#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    /// Maximum number of buffered items. At or above this count, enqueues
    /// fail with [`QueueError::CapacityExceeded`] and dequeues switch to
    /// overflow release. Zero disables the bound.
    pub max_items: usize,

    /// TTL applied to stored entries. An entry that expires while buffered
    /// is silently skipped at dequeue. `None` means entries never expire.
    pub entry_ttl: Option<Duration>,

    /// TTL applied to deduplication markers, bounding how long a repeated
    /// `unique_id` stays suppressed. `None` keeps markers until they are
    /// overwritten by a different `unique_id`.
    pub dedup_window: Option<Duration>,
}

/// Errors surfaced by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue holds `max_items` buffered entries; nothing was changed.
    #[error("queue is full: {count} items buffered, max_items = {max_items}")]
    CapacityExceeded { count: usize, max_items: usize },

    /// Enqueued item had an empty key.
    #[error("item key must not be empty")]
    EmptyKey,

    /// Enqueued item key collides with the reserved dedup marker prefix.
    #[error("item key {key:?} starts with the reserved prefix \"dedupe:\"")]
    ReservedKey { key: String },

    /// A stored key is not valid UTF-8; the store holds data this queue
    /// did not write.
    #[error("stored key is not valid UTF-8: {bytes:?}")]
    KeyNotUtf8 { bytes: Vec<u8> },

    /// A stored value was too short to carry its score suffix. The entry is
    /// left in the store for inspection.
    #[error("corrupt stored value: {0}")]
    Decode(#[from] TruncatedValue),

    /// The underlying store failed; the operation was aborted.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A keyed delay queue with last-write-wins compaction.
///
/// Cheap to share behind an `Arc`; any number of threads may enqueue and
/// dequeue concurrently.
#[derive(Debug)]
pub struct DelayQueue<S> {
    store: S,
    index: Mutex<ScoredSet>,
    buffer_duration: Duration,
    options: QueueOptions,
}

impl<S: ValueStore> DelayQueue<S> {
    /// Builds a queue over `store` with default options, recovering any
    /// state a previous process left in the store.
    ///
    /// `buffer_duration` is how long an item is held before it becomes
    /// eligible for release, measured from its *first* enqueue.
    pub fn new(store: S, buffer_duration: Duration) -> Result<Self, QueueError> {
        DelayQueue::with_options(store, buffer_duration, QueueOptions::default())
    }

    /// Builds a queue over `store` with explicit [`QueueOptions`], recovering
    /// any state a previous process left in the store.
    pub fn with_options(
        store: S,
        buffer_duration: Duration,
        options: QueueOptions,
    ) -> Result<Self, QueueError> {
        let queue = DelayQueue {
            store,
            index: Mutex::new(ScoredSet::new()),
            buffer_duration,
            options,
        };
        queue.recover()?;
        Ok(queue)
    }

    /// Buffers `item`, compacting onto any buffered entry with the same key.
    ///
    /// The stored payload always becomes `item.payload` (last write wins),
    /// while a key already buffered keeps its original release deadline, so
    /// a steadily-updated key still drains within one `buffer_duration` of
    /// its first enqueue.
    ///
    /// When `item.unique_id` is non-empty and matches the key's current
    /// dedup marker, the enqueue is suppressed entirely: no payload is
    /// written and nothing will be released for it. A differing `unique_id`
    /// refreshes the marker and buffers normally.
    pub fn enqueue(&self, item: &Item) -> Result<(), QueueError> {
        if item.key.is_empty() {
            return Err(QueueError::EmptyKey);
        }
        if item.key.starts_with(DEDUPE_PREFIX) {
            return Err(QueueError::ReservedKey {
                key: item.key.clone(),
            });
        }

        // The lock spans the capacity check, the store transaction, and the
        // index upsert; see the module docs.
        let mut index = self.index.lock();

        if self.options.max_items != 0 && index.count() >= self.options.max_items {
            return Err(QueueError::CapacityExceeded {
                count: index.count(),
                max_items: self.options.max_items,
            });
        }

        let score = now_unix_seconds() + self.buffer_duration.as_secs() as i64;

        let suppressed = self.store.update(|txn| -> Result<bool, QueueError> {
            if let Some(unique_id) = item.unique_id.as_deref().filter(|id| !id.is_empty()) {
                let marker_key = dedupe_key(&item.key);
                if let Some(existing) = txn.get(&marker_key)?
                    && existing == unique_id.as_bytes()
                {
                    // Same content seen within the window: commit the (empty)
                    // transaction and drop the item.
                    return Ok(true);
                }
                txn.set(&marker_key, unique_id.as_bytes(), self.options.dedup_window)?;
            }

            let value = codec::encode(&item.payload, score);
            txn.set(item.key.as_bytes(), &value, self.options.entry_ttl)?;
            Ok(false)
        })?;

        if !suppressed && index.get(&item.key).is_none() {
            index.upsert(item.key.clone(), score);
        }
        Ok(())
    }

    /// Releases up to `limit` items.
    ///
    /// Normally this is a **time release**: every buffered entry whose
    /// deadline has arrived, in ascending `(score, key)` order. When the
    /// index has reached `max_items`, it becomes an **overflow release**
    /// that drains from the head of the queue regardless of deadlines.
    ///
    /// Released items carry the latest payload enqueued for their key and
    /// are gone from both the index and the store. A `limit` of zero
    /// returns empty without side effects.
    pub fn dequeue(&self, limit: usize) -> Result<Vec<Item>, QueueError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let candidates = {
            let mut index = self.index.lock();
            if self.options.max_items != 0 && index.count() >= self.options.max_items {
                tracing::debug!(
                    count = index.count(),
                    max_items = self.options.max_items,
                    "queue saturated, overflow release"
                );
                index.pop_by_rank_range(1, limit)
            } else {
                index.pop_by_score_range(i64::MIN, now_unix_seconds(), limit)
            }
        };
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // One transaction for the whole batch, outside the lock. Decoding
        // happens inside so a corrupt value aborts the transaction and the
        // offending entry stays in the store.
        let result = self.store.update(|txn| -> Result<Vec<Item>, QueueError> {
            let mut items = Vec::with_capacity(candidates.len());
            for (key, _) in &candidates {
                let Some(raw) = txn.get(key.as_bytes())? else {
                    // Entry TTL expired, or a racing dequeue got here first.
                    tracing::debug!(key = %key, "indexed entry missing from store, skipping");
                    continue;
                };
                let (_, payload) = codec::decode(&raw)?;
                let payload = payload.to_vec();
                txn.delete(key.as_bytes())?;
                items.push(Item {
                    key: key.clone(),
                    payload,
                    unique_id: None,
                });
            }
            Ok(items)
        });

        match result {
            Ok(items) => Ok(items),
            Err(err) => {
                // Nothing was removed from the store; put the candidates
                // back so they release on a later call.
                let mut index = self.index.lock();
                for (key, score) in candidates {
                    index.upsert(key, score);
                }
                Err(err)
            }
        }
    }

    /// Number of items currently buffered.
    pub fn len(&self) -> usize {
        self.index.lock().count()
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns every key with a live entry in the store, excluding dedup
    /// markers. A utility for inspection, not a hot path.
    pub fn list_keys(&self) -> Result<Vec<String>, QueueError> {
        let mut keys = Vec::new();
        self.store.for_each(|key, _| -> Result<(), QueueError> {
            if key.starts_with(DEDUPE_PREFIX.as_bytes()) {
                return Ok(());
            }
            let key = str::from_utf8(key).map_err(|_| QueueError::KeyNotUtf8 {
                bytes: key.to_vec(),
            })?;
            keys.push(key.to_string());
            Ok(())
        })?;
        Ok(keys)
    }

    /// The underlying store, for backend-specific maintenance such as
    /// [`RedbStore::purge_expired`](crate::store::RedbStore::purge_expired).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Rebuilds the index from the score suffixes of the stored entries.
    fn recover(&self) -> Result<(), QueueError> {
        let mut index = self.index.lock();
        self.store.for_each(|key, value| -> Result<(), QueueError> {
            if key.starts_with(DEDUPE_PREFIX.as_bytes()) {
                return Ok(());
            }
            let key = str::from_utf8(key).map_err(|_| QueueError::KeyNotUtf8 {
                bytes: key.to_vec(),
            })?;
            let (score, _) = codec::decode(value)?;
            index.upsert(key.to_string(), score);
            Ok(())
        })?;

        if !index.is_empty() {
            tracing::debug!(entries = index.count(), "rebuilt delay index from store");
        }
        Ok(())
    }
}

/// Marker key for `key`'s dedup state: `dedupe:<key>`.
fn dedupe_key(key: &str) -> Vec<u8> {
    let mut marker = Vec::with_capacity(DEDUPE_PREFIX.len() + key.len());
    marker.extend_from_slice(DEDUPE_PREFIX.as_bytes());
    marker.extend_from_slice(key.as_bytes());
    marker
}
