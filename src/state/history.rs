//! History manager
//!
//! Keeps a sorted, read-only copy of every stored record. The view is always
//! rebuilt from a full store listing and swapped in as a whole, so readers
//! never observe a half-updated list.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::data::Record;
use super::records::RecordStore;
use super::session::Session;
use crate::error::Result;

#[derive(Debug, Default)]
struct View {
    /// Generation of the listing this view was built from
    generation: u64,
    records: Arc<Vec<Record>>,
}

#[derive(Debug)]
pub struct History {
    records: RecordStore,
    view: RwLock<View>,
    /// Bumped each time a listing starts
    started: AtomicU64,
}

impl History {
    pub fn new(records: RecordStore) -> Self {
        Self {
            records,
            view: RwLock::new(View::default()),
            started: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.records
    }

    /// Re-list the store and replace the cached view. Returns the new length.
    ///
    /// Refreshes may race (one after a delete, one after an analysis). A
    /// listing that started before the one currently installed is discarded,
    /// so the view only ever moves forward.
    pub async fn refresh(&self) -> Result<usize> {
        let generation = self.started.fetch_add(1, Ordering::SeqCst) + 1;

        let mut records = self.records.list_all().await?;
        records.sort_by(Record::newest_first);
        let len = records.len();

        let mut view = self.view.write().await;
        if generation > view.generation {
            *view = View {
                generation,
                records: Arc::new(records),
            };
            tracing::debug!(generation, entries = len, "history view replaced");
        } else {
            tracing::debug!(generation, "stale history listing discarded");
        }

        Ok(view.records.len())
    }

    /// Snapshot of the current view, newest first
    pub async fn entries(&self) -> Arc<Vec<Record>> {
        Arc::clone(&self.view.read().await.records)
    }

    pub async fn len(&self) -> usize {
        self.view.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn latest(&self) -> Option<Record> {
        self.view.read().await.records.first().cloned()
    }

    pub async fn find(&self, id: &str) -> Option<Record> {
        self.view
            .read()
            .await
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Remove a record from the store and rebuild the view.
    ///
    /// The session's displayed result is left alone, even when it shows the
    /// record being deleted.
    pub async fn delete_entry(&self, id: &str) -> Result<usize> {
        self.records.remove(id).await?;
        self.refresh().await
    }

    /// Show a past record in the session without re-running the analysis
    pub async fn select_from_history(&self, id: &str, session: &Session) -> Result<()> {
        let record = match self.find(id).await {
            Some(record) => record,
            // Not cached yet, go to the store
            None => self.records.get(id).await?,
        };
        session.show_record(record).await
    }

    /// Delete every record currently in the view.
    ///
    /// Stops at the first failed removal; the view is rebuilt either way.
    pub async fn clear(&self) -> Result<usize> {
        let entries = self.entries().await;
        for record in entries.iter() {
            if let Err(e) = self.records.remove(&record.id).await {
                if let Err(refresh_err) = self.refresh().await {
                    tracing::warn!("⚠️  History refresh failed: {}", refresh_err);
                }
                return Err(e);
            }
        }
        self.refresh().await
    }
}

/// Ids in view order; handy for assertions and listings
pub fn ids(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}
