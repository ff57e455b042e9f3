use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use remindly_storage::{
    BatchOp, DocumentChange, DocumentStore, Query, StorageError, StoredDocument, Transaction,
};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::query::matches_query;
use crate::transaction::{MemoryTransaction, TransactionStats};

pub type StorageKey = String; // Format: "collection/id"

pub(crate) fn make_storage_key(collection: &str, id: &str) -> StorageKey {
    format!("{collection}/{id}")
}

pub(crate) type DocumentMap = HashMap<StorageKey, StoredDocument>;

/// In-memory document store.
///
/// This storage implementation provides:
/// - Per-document versions bumped on every write
/// - Optimistic transactions that fail on stale reads
/// - Batches applied under one write lock
/// - Conjunctive equality/range queries
#[derive(Debug)]
pub struct InMemoryStore {
    pub(crate) data: Arc<RwLock<DocumentMap>>,
    /// Shared with transactions so commits draw from the same sequence
    pub(crate) version_counter: Arc<AtomicU64>,
    transaction_stats: Arc<TransactionStats>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            version_counter: Arc::new(AtomicU64::new(1)),
            transaction_stats: Arc::new(TransactionStats::default()),
        }
    }

    /// Number of live documents across all collections.
    pub async fn count(&self) -> usize {
        self.data.read().await.len()
    }

    /// Number of live documents in one collection.
    pub async fn count_in(&self, collection: &str) -> usize {
        let prefix = format!("{collection}/");
        self.data
            .read()
            .await
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .count()
    }

    /// Removes every document.
    pub async fn clear(&self) {
        self.data.write().await.clear();
    }

    pub fn transaction_stats(&self) -> &TransactionStats {
        &self.transaction_stats
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn next_version(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::SeqCst)
}

pub(crate) fn ensure_object(fields: &Value) -> Result<(), StorageError> {
    if fields.is_object() {
        Ok(())
    } else {
        Err(StorageError::invalid_document(
            "document fields must be a JSON object",
        ))
    }
}

/// Merge top-level `fields` into `target`, overwriting existing keys.
pub(crate) fn merge_fields(target: &mut Value, fields: &Value) -> Result<(), StorageError> {
    ensure_object(fields)?;
    let (Some(target), Some(fields)) = (target.as_object_mut(), fields.as_object()) else {
        return Err(StorageError::internal("stored document is not an object"));
    };
    for (key, value) in fields {
        target.insert(key.clone(), value.clone());
    }
    Ok(())
}

/// Apply an update to a locked map. Returns `None` if the document is missing.
pub(crate) fn apply_update(
    map: &mut DocumentMap,
    counter: &AtomicU64,
    collection: &str,
    id: &str,
    fields: &Value,
) -> Result<Option<DocumentChange>, StorageError> {
    let key = make_storage_key(collection, id);
    let Some(doc) = map.get_mut(&key) else {
        return Ok(None);
    };
    let before = doc.data.clone();
    merge_fields(&mut doc.data, fields)?;
    doc.version = next_version(counter);
    doc.updated_at = OffsetDateTime::now_utc();
    Ok(Some(DocumentChange::updated(
        collection,
        id,
        before,
        doc.data.clone(),
    )))
}

/// Apply a delete to a locked map. Returns `None` if the document is missing.
pub(crate) fn apply_delete(map: &mut DocumentMap, collection: &str, id: &str) -> Option<DocumentChange> {
    map.remove(&make_storage_key(collection, id))
        .map(|doc| DocumentChange::deleted(collection, id, doc.data))
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn create(&self, collection: &str, fields: Value) -> Result<StoredDocument, StorageError> {
        ensure_object(&fields)?;
        let id = uuid::Uuid::new_v4().to_string();
        let doc = StoredDocument {
            collection: collection.to_string(),
            id: id.clone(),
            version: next_version(&self.version_counter),
            data: fields,
            updated_at: OffsetDateTime::now_utc(),
        };
        let mut guard = self.data.write().await;
        guard.insert(make_storage_key(collection, &id), doc.clone());
        Ok(doc)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, StorageError> {
        let guard = self.data.read().await;
        Ok(guard.get(&make_storage_key(collection, id)).cloned())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<DocumentChange, StorageError> {
        let mut guard = self.data.write().await;
        apply_update(&mut guard, &self.version_counter, collection, id, &fields)?
            .ok_or_else(|| StorageError::not_found(collection, id))
    }

    async fn delete(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<DocumentChange>, StorageError> {
        let mut guard = self.data.write().await;
        Ok(apply_delete(&mut guard, collection, id))
    }

    async fn query(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<StoredDocument>, StorageError> {
        let guard = self.data.read().await;
        let mut results: Vec<StoredDocument> = guard
            .values()
            .filter(|doc| doc.collection == collection && matches_query(&doc.data, query))
            .cloned()
            .collect();
        results.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> Result<Vec<DocumentChange>, StorageError> {
        for op in &ops {
            if let BatchOp::Update { fields, .. } = op {
                ensure_object(fields)?;
            }
        }

        let mut guard = self.data.write().await;
        let mut changes = Vec::with_capacity(ops.len());
        for op in &ops {
            let change = match op {
                BatchOp::Update {
                    collection,
                    id,
                    fields,
                } => apply_update(&mut guard, &self.version_counter, collection, id, fields)?,
                BatchOp::Delete { collection, id } => apply_delete(&mut guard, collection, id),
            };
            changes.extend(change);
        }
        Ok(changes)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StorageError> {
        Ok(Box::new(MemoryTransaction::new(
            self.data.clone(),
            self.version_counter.clone(),
            self.transaction_stats.clone(),
        )))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_storage_basic_operations() {
        let store = InMemoryStore::new();

        let created = store
            .create("notification_jobs", json!({"status": "pending"}))
            .await
            .unwrap();
        assert_eq!(store.count().await, 1);
        assert_eq!(created.collection, "notification_jobs");

        let fetched = store
            .get("notification_jobs", &created.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.data, json!({"status": "pending"}));

        let change = store
            .update(
                "notification_jobs",
                &created.id,
                json!({"status": "processing", "processingStartedAt": 5}),
            )
            .await
            .unwrap();
        assert_eq!(change.before, Some(json!({"status": "pending"})));
        assert_eq!(
            change.after,
            Some(json!({"status": "processing", "processingStartedAt": 5}))
        );

        let updated = store
            .get("notification_jobs", &created.id)
            .await
            .unwrap()
            .unwrap();
        assert!(updated.version > created.version);

        let removed = store.delete("notification_jobs", &created.id).await.unwrap();
        assert!(removed.is_some());
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let store = InMemoryStore::new();
        let removed = store.delete("notification_jobs", "ghost").await.unwrap();
        assert!(removed.is_none());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .update("notification_jobs", "ghost", json!({"status": "processing"}))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_rejects_non_object() {
        let store = InMemoryStore::new();
        let err = store.create("schedules", json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidDocument { .. }));
    }

    #[tokio::test]
    async fn test_query_scoped_to_collection_with_limit() {
        let store = InMemoryStore::new();
        for _ in 0..3 {
            store
                .create("notification_jobs", json!({"scheduleId": "s1"}))
                .await
                .unwrap();
        }
        store
            .create("notification_requests", json!({"scheduleId": "s1"}))
            .await
            .unwrap();

        let query = Query::new().where_eq("scheduleId", "s1");
        assert_eq!(store.query("notification_jobs", &query).await.unwrap().len(), 3);
        assert_eq!(
            store
                .query("notification_jobs", &query.clone().with_limit(1))
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(store.count_in("notification_requests").await, 1);
    }

    #[tokio::test]
    async fn test_batch_skips_missing_documents() {
        let store = InMemoryStore::new();
        let a = store.create("c", json!({"n": 1})).await.unwrap();
        let b = store.create("c", json!({"n": 2})).await.unwrap();

        let changes = store
            .batch(vec![
                BatchOp::delete("c", &a.id),
                BatchOp::delete("c", "ghost"),
                BatchOp::update("c", &b.id, json!({"n": 3})),
            ])
            .await
            .unwrap();

        assert_eq!(changes.len(), 2);
        assert_eq!(store.count().await, 1);
        let b = store.get("c", &b.id).await.unwrap().unwrap();
        assert_eq!(b.data, json!({"n": 3}));
    }
}
