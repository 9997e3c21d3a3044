//! Durable store backend on top of `redb`.
//!
//! All entries live in a single byte-keyed table. Each stored value is a
//! bincode-encoded [`Record`] wrapping the caller's bytes together with an
//! optional absolute expiry, since `redb` has no native TTL. Expiry is
//! enforced lazily: an expired record reads as absent and is skipped during
//! iteration. The bytes themselves are reclaimed by [`RedbStore::purge_expired`],
//! which callers can run from a maintenance task at whatever cadence suits
//! them.
//!
//! `redb` serializes writers internally, so `update` transactions never
//! observe write-write conflicts; a failed commit leaves the database
//! untouched.

use std::path::Path;
use std::time::Duration;

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use super::{ReadTxn, StoreError, ValueStore, WriteTxn};
use crate::clock::now_unix_seconds;

const ENTRIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entries");

/// On-disk record envelope: caller bytes plus optional expiry.
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    value: Vec<u8>,
    expires_at: Option<i64>,
}

impl Record {
    fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(at) if now > at)
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        bincode::deserialize(bytes).map_err(|err| StoreError::Corrupt(err))
    }
}

/// A transactional key-value store persisted in a `redb` database file.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Opens the database at `path`, creating it (and the entry table) if it
    /// does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(|err| StoreError::Open(Box::new(err)))?;

        // Create the table eagerly so read transactions never race a missing
        // table on a fresh database.
        let txn = db.begin_write().map_err(begin_err)?;
        txn.open_table(ENTRIES).map_err(begin_err)?;
        txn.commit().map_err(commit_err)?;

        Ok(RedbStore { db })
    }

    /// Deletes up to `batch_limit` expired records, reclaiming their space.
    ///
    /// Expired records already read as absent; this sweep only exists to
    /// bound on-disk growth. Returns the number of records removed. Safe to
    /// call at any time, including concurrently with queue traffic.
    pub fn purge_expired(&self, batch_limit: usize) -> Result<usize, StoreError> {
        let now = now_unix_seconds();

        // Scan first, then delete in a second transaction, to keep the write
        // transaction short.
        let expired: Vec<Vec<u8>> = {
            let txn = self.db.begin_read().map_err(begin_err)?;
            let table = txn.open_table(ENTRIES).map_err(begin_err)?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(iterate_err)? {
                if keys.len() >= batch_limit {
                    break;
                }
                let (key, value) = entry.map_err(iterate_err)?;
                if Record::decode(value.value())?.is_expired(now) {
                    keys.push(key.value().to_vec());
                }
            }
            keys
        };

        if expired.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin_write().map_err(begin_err)?;
        {
            let mut table = txn.open_table(ENTRIES).map_err(begin_err)?;
            for key in &expired {
                table
                    .remove(key.as_slice())
                    .map_err(|err| StoreError::Delete(Box::new(err)))?;
            }
        }
        txn.commit().map_err(commit_err)?;

        tracing::debug!(removed = expired.len(), "purged expired store records");
        Ok(expired.len())
    }
}

impl ValueStore for RedbStore {
    fn update<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn WriteTxn) -> Result<R, E>,
        E: From<StoreError>,
    {
        let txn = self.db.begin_write().map_err(|err| E::from(begin_err(err)))?;
        let result = {
            let mut table = txn
                .open_table(ENTRIES)
                .map_err(|err| E::from(begin_err(err)))?;
            let mut wrapper = RedbWriteTxn {
                table: &mut table,
                now: now_unix_seconds(),
            };
            f(&mut wrapper)
        };
        match result {
            Ok(value) => {
                txn.commit().map_err(|err| E::from(commit_err(err)))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = txn.abort() {
                    tracing::warn!(error = %abort_err, "failed to abort store transaction");
                }
                Err(err)
            }
        }
    }

    fn view<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&dyn ReadTxn) -> Result<R, E>,
        E: From<StoreError>,
    {
        let txn = self.db.begin_read().map_err(|err| E::from(begin_err(err)))?;
        let table = txn
            .open_table(ENTRIES)
            .map_err(|err| E::from(begin_err(err)))?;
        let wrapper = RedbReadTxn {
            table,
            now: now_unix_seconds(),
        };
        f(&wrapper)
    }

    fn for_each<E, F>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(&[u8], &[u8]) -> Result<(), E>,
        E: From<StoreError>,
    {
        let txn = self.db.begin_read().map_err(|err| E::from(begin_err(err)))?;
        let table = txn
            .open_table(ENTRIES)
            .map_err(|err| E::from(begin_err(err)))?;
        let now = now_unix_seconds();

        for entry in table.iter().map_err(|err| E::from(iterate_err(err)))? {
            let (key, value) = entry.map_err(|err| E::from(iterate_err(err)))?;
            let record = Record::decode(value.value()).map_err(E::from)?;
            if record.is_expired(now) {
                continue;
            }
            visit(key.value(), &record.value)?;
        }
        Ok(())
    }
}

fn begin_err(err: impl std::error::Error + Send + Sync + 'static) -> StoreError {
    StoreError::Begin(Box::new(err))
}

fn commit_err(err: impl std::error::Error + Send + Sync + 'static) -> StoreError {
    StoreError::Commit(Box::new(err))
}

fn iterate_err(err: impl std::error::Error + Send + Sync + 'static) -> StoreError {
    StoreError::Iterate(Box::new(err))
}

struct RedbReadTxn {
    table: redb::ReadOnlyTable<&'static [u8], &'static [u8]>,
    now: i64,
}

impl ReadTxn for RedbReadTxn {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(guard) = self
            .table
            .get(key)
            .map_err(|err| StoreError::Get(Box::new(err)))?
        else {
            return Ok(None);
        };
        let record = Record::decode(guard.value())?;
        if record.is_expired(self.now) {
            return Ok(None);
        }
        Ok(Some(record.value))
    }
}

struct RedbWriteTxn<'a, 'txn> {
    table: &'a mut redb::Table<'txn, &'static [u8], &'static [u8]>,
    now: i64,
}

impl ReadTxn for RedbWriteTxn<'_, '_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(guard) = self
            .table
            .get(key)
            .map_err(|err| StoreError::Get(Box::new(err)))?
        else {
            return Ok(None);
        };
        let record = Record::decode(guard.value())?;
        if record.is_expired(self.now) {
            return Ok(None);
        }
        Ok(Some(record.value))
    }
}

impl WriteTxn for RedbWriteTxn<'_, '_> {
    fn set(&mut self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError> {
        let record = Record {
            value: value.to_vec(),
            expires_at: ttl.map(|ttl| self.now + ttl.as_secs() as i64),
        };
        let bytes = bincode::serialize(&record).map_err(|err| StoreError::Set(err))?;
        self.table
            .insert(key, bytes.as_slice())
            .map_err(|err| StoreError::Set(Box::new(err)))?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.table
            .remove(key)
            .map_err(|err| StoreError::Delete(Box::new(err)))?;
        Ok(())
    }
}
