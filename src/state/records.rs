//! Record store adapter
//!
//! Scopes analysis records under `<prefix>:<id>` in the key-value store.
//! There is no caching here: every call goes to the store.

use futures::future::join_all;
use std::sync::Arc;

use super::data::Record;
use super::library::KvStore;
use crate::error::{Error, Result};

/// Key prefix used for analysis records unless configured otherwise
pub const DEFAULT_PREFIX: &str = "crack-analysis";

#[derive(Clone)]
pub struct RecordStore {
    store: Arc<dyn KvStore>,
    prefix: String,
}

impl RecordStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_prefix(store, DEFAULT_PREFIX)
    }

    pub fn with_prefix(store: Arc<dyn KvStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn key(&self, id: &str) -> String {
        format!("{}:{}", self.prefix, id)
    }

    /// Serialize and write a record. On error the record must be assumed
    /// not persisted. Records are immutable: an id that is already stored
    /// fails with [`Error::DuplicateRecord`] and leaves the old record alone.
    pub async fn put(&self, record: &Record) -> Result<()> {
        let json = serde_json::to_string(record).map_err(|e| Error::StoreWrite(e.to_string()))?;
        if !self.store.insert(&self.key(&record.id), &json).await? {
            return Err(Error::DuplicateRecord(record.id.clone()));
        }

        tracing::info!(id = %record.id, bytes = json.len(), "💾 Record persisted");
        Ok(())
    }

    /// Delete a record. Removing an unknown id is not an error.
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.store.delete(&self.key(id)).await?;
        tracing::info!(id = %id, "🗑️  Record removed");
        Ok(())
    }

    /// Load a single record by id
    pub async fn get(&self, id: &str) -> Result<Record> {
        let key = self.key(id);
        let json = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| Error::RecordNotFound(id.to_string()))?;

        serde_json::from_str(&json).map_err(|e| Error::StoreReadCorruption {
            key,
            reason: e.to_string(),
        })
    }

    /// Every parseable record under the prefix, in no particular order.
    ///
    /// Values are fetched concurrently. Entries that vanish, fail to read, or
    /// fail to parse are dropped with a warning; only a failure to list keys
    /// fails the call.
    pub async fn list_all(&self) -> Result<Vec<Record>> {
        let keys = self.store.list(&format!("{}:", self.prefix)).await?;

        let fetches = keys.into_iter().map(|key| async move {
            let value = self.store.get(&key).await;
            (key, value)
        });

        let mut records = Vec::new();
        let mut dropped = 0usize;

        for (key, value) in join_all(fetches).await {
            match value.and_then(|v| v.ok_or_else(|| Error::RecordNotFound(key.clone()))) {
                Ok(json) => match serde_json::from_str::<Record>(&json) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        dropped += 1;
                        let err = Error::StoreReadCorruption {
                            key,
                            reason: e.to_string(),
                        };
                        tracing::warn!("⚠️  Skipping history entry: {}", err);
                    }
                },
                // Deleted between list and get
                Err(Error::RecordNotFound(_)) => {}
                Err(e) => {
                    dropped += 1;
                    tracing::warn!(key = %key, "⚠️  Could not read history entry: {}", e);
                }
            }
        }

        tracing::debug!(loaded = records.len(), dropped, "history listing complete");
        Ok(records)
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("prefix", &self.prefix)
            .finish()
    }
}
