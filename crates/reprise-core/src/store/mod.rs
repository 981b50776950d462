//! Local persistence of resource records.
//!
//! The host supplies a plain [`KeyValueStore`]; [`LocalRecordStore`] layers the
//! record namespace, JSON encoding and validation on top of it. Every write is
//! a single-key upsert so foreground edits and sync backfills never clobber
//! each other through a bulk overwrite.

mod memory;
mod migrations;
mod sqlite;

use std::collections::BTreeSet;
use std::sync::Arc;

pub use memory::MemoryKvStore;
pub use sqlite::SqliteKvStore;

use crate::error::{Error, Result};
use crate::models::{ResourceKey, ResourceRecord, Snapshot};

/// Namespace of record entries
pub const RECORD_PREFIX: &str = "reprise.rec:";
/// Namespace of engine bookkeeping entries
pub const META_PREFIX: &str = "reprise.meta:";

const CLEARED_AT_KEY: &str = "reprise.meta:cleared_at";

/// Minimal string key-value storage provided by the host.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Upsert a single entry.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;

    /// All keys starting with `prefix`.
    fn list_keys(&self, prefix: &str) -> Result<BTreeSet<String>>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn list_keys(&self, prefix: &str) -> Result<BTreeSet<String>> {
        (**self).list_keys(prefix)
    }
}

/// Typed access to the records held in a [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct LocalRecordStore<S> {
    store: S,
}

impl<S: KeyValueStore> LocalRecordStore<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Read one record. A stored value that fails to decode or validate is
    /// reported as [`Error::Validation`].
    pub fn get(&self, key: &ResourceKey) -> Result<Option<ResourceRecord>> {
        let Some(raw) = self.store.get(&storage_key(key))? else {
            return Ok(None);
        };
        decode_record(key, &raw).map(Some)
    }

    /// Upsert one record after validating it.
    pub fn put(&self, record: &ResourceRecord) -> Result<()> {
        record.validate()?;
        let raw = serde_json::to_string(record)?;
        self.store.set(&storage_key(&record.key), &raw)
    }

    pub fn delete(&self, key: &ResourceKey) -> Result<()> {
        self.store.delete(&storage_key(key))
    }

    /// Keys of every stored record.
    pub fn keys(&self) -> Result<Vec<ResourceKey>> {
        let mut keys = Vec::new();
        for raw in self.store.list_keys(RECORD_PREFIX)? {
            let suffix = raw.strip_prefix(RECORD_PREFIX).unwrap_or(&raw);
            match suffix.parse::<ResourceKey>() {
                Ok(key) => keys.push(key),
                Err(error) => {
                    tracing::warn!(storage_key = %raw, "Skipping unreadable key: {error}");
                }
            }
        }
        Ok(keys)
    }

    /// Fresh copy of every valid record. Invalid records are skipped with a warning.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new();
        for key in self.keys()? {
            match self.get(&key) {
                Ok(Some(record)) => {
                    snapshot.insert(key, record);
                }
                Ok(None) => {}
                Err(Error::Validation(message)) => {
                    tracing::warn!(key = %key, "Dropping invalid local record: {message}");
                }
                Err(error) => return Err(error),
            }
        }
        Ok(snapshot)
    }

    /// Time of the last pending "clear all", if it has not been synced yet.
    pub fn cleared_at(&self) -> Result<Option<i64>> {
        let Some(raw) = self.store.get(CLEARED_AT_KEY)? else {
            return Ok(None);
        };
        raw.trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| Error::Validation(format!("invalid cleared_at marker '{raw}'")))
    }

    pub fn set_cleared_at(&self, timestamp_ms: i64) -> Result<()> {
        self.store.set(CLEARED_AT_KEY, &timestamp_ms.to_string())
    }

    pub fn clear_cleared_at(&self) -> Result<()> {
        self.store.delete(CLEARED_AT_KEY)
    }
}

fn storage_key(key: &ResourceKey) -> String {
    format!("{RECORD_PREFIX}{key}")
}

fn decode_record(key: &ResourceKey, raw: &str) -> Result<ResourceRecord> {
    let record: ResourceRecord = serde_json::from_str(raw)
        .map_err(|error| Error::Validation(format!("record {key} is not valid JSON: {error}")))?;
    if &record.key != key {
        return Err(Error::Validation(format!(
            "record stored under {key} claims key {}",
            record.key
        )));
    }
    record.validate()?;
    Ok(record)
}
