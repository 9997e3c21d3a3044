//! Durable value storage behind the queue.
//!
//! The queue talks to storage through the [`ValueStore`] trait: closure-scoped
//! transactions that commit when the closure returns `Ok` and abort when it
//! returns `Err`, plus a full-keyspace scan used once at startup to rebuild
//! the in-memory index. Two backends ship with the crate:
//!
//! - [`RedbStore`]: an on-disk `redb` database with per-entry TTL enforced
//!   lazily at read time.
//! - [`MemoryStore`]: a `BTreeMap` with copy-on-write transactions, for
//!   tests and ephemeral queues.
//!
//! TTLs are second-granular. An expired entry reads as absent and is skipped
//! by iteration; backends may reclaim the bytes later (see
//! [`RedbStore::purge_expired`]).

use std::time::Duration;

use thiserror::Error;

pub mod memory;
pub mod redb;

pub use self::memory::MemoryStore;
pub use self::redb::RedbStore;

/// Boxed backend error carried inside [`StoreError`] variants.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by store backends, split by the operation that failed.
///
/// A failed transaction is always discarded in full; no variant leaves the
/// store partially mutated.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening or creating the backing database failed.
    #[error("store open failed: {0}")]
    Open(#[source] BoxedError),

    /// Beginning a transaction failed.
    #[error("store transaction begin failed: {0}")]
    Begin(#[source] BoxedError),

    /// A read inside a transaction failed.
    #[error("store get failed: {0}")]
    Get(#[source] BoxedError),

    /// A write inside a transaction failed.
    #[error("store set failed: {0}")]
    Set(#[source] BoxedError),

    /// A delete inside a transaction failed.
    #[error("store delete failed: {0}")]
    Delete(#[source] BoxedError),

    /// Committing a transaction failed; none of its writes took effect.
    #[error("store commit failed: {0}")]
    Commit(#[source] BoxedError),

    /// A keyspace scan failed.
    #[error("store iteration failed: {0}")]
    Iterate(#[source] BoxedError),

    /// A stored record could not be decoded by the backend.
    #[error("store record corrupt: {0}")]
    Corrupt(#[source] BoxedError),
}

/// Read operations available inside any transaction.
pub trait ReadTxn {
    /// Returns the live value stored under `key`, if any.
    ///
    /// Entries past their TTL read as absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
}

/// Write operations available inside a read-write transaction.
///
/// Reads through a write transaction observe the transaction's own earlier
/// writes.
pub trait WriteTxn: ReadTxn {
    /// Stores `value` under `key`, replacing any previous value. A `ttl`
    /// makes the entry read as absent once that much time has passed.
    fn set(&mut self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Removes `key`. Removing an absent key is not an error.
    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError>;
}

/// A transactional key-value store.
///
/// Closure-scoped transactions keep commit/abort handling in one place: the
/// backend commits when the closure returns `Ok` and discards the
/// transaction when it returns `Err` (or propagates its own failure as a
/// [`StoreError`]). The error type is generic so callers can thread their
/// own error enums through a transaction, as long as backend failures can be
/// converted into them.
pub trait ValueStore {
    /// Runs `f` inside a read-write transaction, committing on `Ok`.
    fn update<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn WriteTxn) -> Result<R, E>,
        E: From<StoreError>;

    /// Runs `f` inside a read-only transaction.
    fn view<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&dyn ReadTxn) -> Result<R, E>,
        E: From<StoreError>;

    /// Visits every live entry in the store, in unspecified order.
    ///
    /// Only used at recovery; not part of any hot path.
    fn for_each<E, F>(&self, visit: F) -> Result<(), E>
    where
        F: FnMut(&[u8], &[u8]) -> Result<(), E>,
        E: From<StoreError>;
}
