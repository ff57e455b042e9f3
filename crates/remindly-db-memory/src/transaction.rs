use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use remindly_storage::{DocumentChange, StorageError, StoredDocument, Transaction};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::storage::{
    DocumentMap, StorageKey, apply_delete, apply_update, ensure_object, make_storage_key,
};

/// Counters describing transaction outcomes, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct TransactionStats {
    started: AtomicU64,
    committed: AtomicU64,
    conflicts: AtomicU64,
    rolled_back: AtomicU64,
}

/// Point-in-time copy of [`TransactionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStatsSnapshot {
    pub started: u64,
    pub committed: u64,
    pub conflicts: u64,
    pub rolled_back: u64,
}

impl TransactionStats {
    pub fn snapshot(&self) -> TransactionStatsSnapshot {
        TransactionStatsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
enum PendingWrite {
    Update {
        collection: String,
        id: String,
        fields: Value,
    },
    Delete {
        collection: String,
        id: String,
    },
}

/// Version observed for a document read inside the transaction.
#[derive(Debug, Clone)]
struct ReadRecord {
    collection: String,
    id: String,
    version: Option<u64>,
}

/// Optimistic transaction over an [`crate::InMemoryStore`].
///
/// Reads take the shared lock and remember the version they saw. Commit takes
/// the exclusive lock, re-checks every remembered version and only then
/// applies the buffered writes, so a commit either lands completely on the
/// exact state it read or fails with a conflict.
pub struct MemoryTransaction {
    data: Arc<RwLock<DocumentMap>>,
    version_counter: Arc<AtomicU64>,
    stats: Arc<TransactionStats>,
    reads: HashMap<StorageKey, ReadRecord>,
    writes: Vec<PendingWrite>,
}

impl MemoryTransaction {
    pub(crate) fn new(
        data: Arc<RwLock<DocumentMap>>,
        version_counter: Arc<AtomicU64>,
        stats: Arc<TransactionStats>,
    ) -> Self {
        stats.started.fetch_add(1, Ordering::Relaxed);
        Self {
            data,
            version_counter,
            stats,
            reads: HashMap::new(),
            writes: Vec::new(),
        }
    }

    fn check_reads(&self, map: &DocumentMap) -> Result<(), StorageError> {
        for (key, read) in &self.reads {
            let current = map.get(key).map(|doc| doc.version);
            if current != read.version {
                return Err(StorageError::transaction_conflict(&read.collection, &read.id));
            }
        }
        Ok(())
    }

    fn check_update_targets(&self, map: &DocumentMap) -> Result<(), StorageError> {
        for write in &self.writes {
            if let PendingWrite::Update { collection, id, .. } = write
                && !map.contains_key(&make_storage_key(collection, id))
            {
                return Err(StorageError::not_found(collection, id));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(
        &mut self,
        collection: &str,
        id: &str,
    ) -> Result<Option<StoredDocument>, StorageError> {
        let key = make_storage_key(collection, id);
        let doc = self.data.read().await.get(&key).cloned();
        // The first read wins; later reads of the same key must not mask a
        // write that happened in between.
        self.reads.entry(key).or_insert_with(|| ReadRecord {
            collection: collection.to_string(),
            id: id.to_string(),
            version: doc.as_ref().map(|d| d.version),
        });
        Ok(doc)
    }

    fn update(&mut self, collection: &str, id: &str, fields: Value) -> Result<(), StorageError> {
        ensure_object(&fields)?;
        self.writes.push(PendingWrite::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        });
        Ok(())
    }

    fn delete(&mut self, collection: &str, id: &str) -> Result<(), StorageError> {
        self.writes.push(PendingWrite::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<Vec<DocumentChange>, StorageError> {
        let mut guard = self.data.write().await;

        if let Err(e) = self.check_reads(&guard) {
            self.stats.conflicts.fetch_add(1, Ordering::Relaxed);
            debug!(error = %e, "Transaction commit rejected");
            return Err(e);
        }
        self.check_update_targets(&guard)?;

        let mut changes = Vec::with_capacity(self.writes.len());
        for write in &self.writes {
            let change = match write {
                PendingWrite::Update {
                    collection,
                    id,
                    fields,
                } => apply_update(&mut guard, &self.version_counter, collection, id, fields)?,
                PendingWrite::Delete { collection, id } => apply_delete(&mut guard, collection, id),
            };
            changes.extend(change);
        }

        self.stats.committed.fetch_add(1, Ordering::Relaxed);
        Ok(changes)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.stats.rolled_back.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
