//! In-memory store backend.
//!
//! Transactions are copy-on-write: an update stages its writes on a clone of
//! the map and swaps the clone in only when the closure commits, so an
//! aborted transaction leaves no trace. Suits tests and queues that do not
//! need to survive a restart.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;

use super::{ReadTxn, StoreError, ValueStore, WriteTxn};
use crate::clock::now_unix_seconds;

#[derive(Debug, Clone)]
struct Record {
    value: Vec<u8>,
    expires_at: Option<i64>,
}

impl Record {
    fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(at) if now > at)
    }
}

/// A transactional in-memory key-value store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<Vec<u8>, Record>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl ValueStore for MemoryStore {
    fn update<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn WriteTxn) -> Result<R, E>,
        E: From<StoreError>,
    {
        let mut entries = self.entries.lock();
        let mut staged = entries.clone();
        let result = {
            let mut txn = MemoryWriteTxn {
                entries: &mut staged,
                now: now_unix_seconds(),
            };
            f(&mut txn)
        };
        match result {
            Ok(value) => {
                *entries = staged;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }

    fn view<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&dyn ReadTxn) -> Result<R, E>,
        E: From<StoreError>,
    {
        let entries = self.entries.lock();
        let txn = MemoryReadTxn {
            entries: &entries,
            now: now_unix_seconds(),
        };
        f(&txn)
    }

    fn for_each<E, F>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(&[u8], &[u8]) -> Result<(), E>,
        E: From<StoreError>,
    {
        let entries = self.entries.lock();
        let now = now_unix_seconds();
        for (key, record) in entries.iter() {
            if record.is_expired(now) {
                continue;
            }
            visit(key, &record.value)?;
        }
        Ok(())
    }
}

struct MemoryReadTxn<'a> {
    entries: &'a BTreeMap<Vec<u8>, Record>,
    now: i64,
}

impl ReadTxn for MemoryReadTxn<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .entries
            .get(key)
            .filter(|record| !record.is_expired(self.now))
            .map(|record| record.value.clone()))
    }
}

struct MemoryWriteTxn<'a> {
    entries: &'a mut BTreeMap<Vec<u8>, Record>,
    now: i64,
}

impl ReadTxn for MemoryWriteTxn<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .entries
            .get(key)
            .filter(|record| !record.is_expired(self.now))
            .map(|record| record.value.clone()))
    }
}

impl WriteTxn for MemoryWriteTxn<'_> {
    fn set(&mut self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError> {
        let record = Record {
            value: value.to_vec(),
            expires_at: ttl.map(|ttl| self.now + ttl.as_secs() as i64),
        };
        self.entries.insert(key.to_vec(), record);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}
