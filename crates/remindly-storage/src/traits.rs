//! Storage traits for the document store abstraction layer.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;
use crate::types::{BatchOp, DocumentChange, Query, StoredDocument};

/// The document store contract every backend implements.
///
/// Documents are JSON objects addressed by `(collection, id)`. Only
/// single-call atomicity is offered: each method commits on its own, and
/// [`DocumentStore::batch`] is atomic per call but not with any other call.
/// Cross-document coordination is left to callers.
///
/// # Example
///
/// ```ignore
/// use remindly_storage::{DocumentStore, Query, StorageError};
///
/// async fn pending_jobs(store: &dyn DocumentStore) -> Result<usize, StorageError> {
///     let query = Query::new().where_eq("status", "pending");
///     Ok(store.query("notification_jobs", &query).await?.len())
/// }
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates a new document with a store-assigned ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidDocument` if `fields` is not a JSON object.
    async fn create(&self, collection: &str, fields: Value) -> Result<StoredDocument, StorageError>;

    /// Reads a document by ID. Returns `None` if it does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, StorageError>;

    /// Merges `fields` into an existing document's top-level fields.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the document does not exist.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<DocumentChange, StorageError>;

    /// Deletes a document.
    ///
    /// Deleting a missing document succeeds and returns `None`.
    async fn delete(&self, collection: &str, id: &str)
    -> Result<Option<DocumentChange>, StorageError>;

    /// Returns all documents in `collection` matching every filter in `query`.
    async fn query(&self, collection: &str, query: &Query)
    -> Result<Vec<StoredDocument>, StorageError>;

    /// Applies a group of writes in one commit.
    ///
    /// Operations targeting missing documents are skipped; the returned list
    /// holds only the changes that were applied.
    async fn batch(&self, ops: Vec<BatchOp>) -> Result<Vec<DocumentChange>, StorageError>;

    /// Begins an optimistic read-modify-write transaction.
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StorageError>;

    /// Returns the name of this storage backend for logging.
    fn backend_name(&self) -> &'static str;
}

/// An optimistic read-modify-write transaction.
///
/// Reads go to the store and record the version observed; writes are
/// buffered until [`Transaction::commit`]. The commit fails with
/// `StorageError::TransactionConflict` if any document read through this
/// transaction was written by someone else in the meantime, in which case
/// nothing is applied and the caller re-runs its body on a fresh transaction.
///
/// # Example
///
/// ```ignore
/// let mut tx = store.begin_transaction().await?;
/// if let Some(doc) = tx.get("notification_jobs", id).await? {
///     tx.update("notification_jobs", id, json!({"status": "processing"}))?;
/// }
/// tx.commit().await?;
/// ```
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Reads a document and records its version for conflict detection.
    async fn get(
        &mut self,
        collection: &str,
        id: &str,
    ) -> Result<Option<StoredDocument>, StorageError>;

    /// Buffers a field merge to apply on commit.
    fn update(&mut self, collection: &str, id: &str, fields: Value) -> Result<(), StorageError>;

    /// Buffers a delete to apply on commit.
    fn delete(&mut self, collection: &str, id: &str) -> Result<(), StorageError>;

    /// Validates every read and applies buffered writes atomically.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::TransactionConflict` when a read is stale.
    async fn commit(self: Box<Self>) -> Result<Vec<DocumentChange>, StorageError>;

    /// Discards buffered writes.
    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}
