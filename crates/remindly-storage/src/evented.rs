//! EventedStore - a store wrapper that publishes change events after writes.
//!
//! This wrapper delegates all operations to an inner store while emitting a
//! [`DocumentEvent`] for every committed change. It is the reactive trigger
//! source: subscribers see creates, updates (with before/after images) and
//! deletes, including writes made through batches and transactions.
//!
//! # Example
//!
//! ```ignore
//! use remindly_storage::{EventBroadcaster, EventedStore};
//!
//! let broadcaster = EventBroadcaster::new_shared();
//! let store = EventedStore::new(memory_store, broadcaster.clone());
//! let mut events = broadcaster.subscribe();
//!
//! store.create("notification_requests", fields).await?;
//! let event = events.recv().await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::StorageError;
use crate::traits::{DocumentStore, Transaction};
use crate::types::{BatchOp, ChangeKind, DocumentChange, Query, StoredDocument};

/// Events beyond this limit are dropped for slow receivers.
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// A committed change to one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DocumentEvent {
    Created {
        collection: String,
        id: String,
        data: Value,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    Updated {
        collection: String,
        id: String,
        before: Value,
        after: Value,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    Deleted {
        collection: String,
        id: String,
        before: Value,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
}

impl DocumentEvent {
    /// Builds the event matching a committed change.
    pub fn from_change(change: DocumentChange) -> Self {
        let timestamp = OffsetDateTime::now_utc();
        let DocumentChange {
            collection,
            id,
            before,
            after,
        } = change;
        match (before, after) {
            (Some(before), Some(after)) => Self::Updated {
                collection,
                id,
                before,
                after,
                timestamp,
            },
            (Some(before), None) => Self::Deleted {
                collection,
                id,
                before,
                timestamp,
            },
            (None, after) => Self::Created {
                collection,
                id,
                data: after.unwrap_or(Value::Null),
                timestamp,
            },
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            Self::Created { collection, .. }
            | Self::Updated { collection, .. }
            | Self::Deleted { collection, .. } => collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Created { id, .. } | Self::Updated { id, .. } | Self::Deleted { id, .. } => id,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Created { .. } => ChangeKind::Created,
            Self::Updated { .. } => ChangeKind::Updated,
            Self::Deleted { .. } => ChangeKind::Deleted,
        }
    }
}

/// Broadcast channel for document events.
///
/// Cheap to clone; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<DocumentEvent>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns the number of subscribers that received the event.
    pub fn send(&self, event: DocumentEvent) -> usize {
        self.sender.send(event).unwrap_or_default()
    }

    /// Events sent before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

fn publish(broadcaster: &EventBroadcaster, change: DocumentChange) {
    if broadcaster.subscriber_count() == 0 {
        return;
    }
    let event = DocumentEvent::from_change(change);
    let collection = event.collection().to_string();
    let id = event.id().to_string();
    let kind = event.kind();
    let count = broadcaster.send(event);
    debug!(
        collection = %collection,
        document_id = %id,
        kind = ?kind,
        subscribers = count,
        "Emitted document event"
    );
}

/// A store wrapper that emits events after successful writes.
///
/// Events are emitted only after the inner call succeeds, so every event
/// corresponds to a change that actually landed.
pub struct EventedStore<S: DocumentStore> {
    inner: S,
    broadcaster: Arc<EventBroadcaster>,
}

impl<S: DocumentStore> EventedStore<S> {
    pub fn new(inner: S, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self { inner, broadcaster }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for EventedStore<S> {
    async fn create(&self, collection: &str, fields: Value) -> Result<StoredDocument, StorageError> {
        let created = self.inner.create(collection, fields).await?;
        publish(
            &self.broadcaster,
            DocumentChange::created(&created.collection, &created.id, created.data.clone()),
        );
        Ok(created)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, StorageError> {
        self.inner.get(collection, id).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<DocumentChange, StorageError> {
        let change = self.inner.update(collection, id, fields).await?;
        publish(&self.broadcaster, change.clone());
        Ok(change)
    }

    async fn delete(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<DocumentChange>, StorageError> {
        let change = self.inner.delete(collection, id).await?;
        if let Some(ref change) = change {
            publish(&self.broadcaster, change.clone());
        }
        Ok(change)
    }

    async fn query(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<StoredDocument>, StorageError> {
        self.inner.query(collection, query).await
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> Result<Vec<DocumentChange>, StorageError> {
        let changes = self.inner.batch(ops).await?;
        for change in &changes {
            publish(&self.broadcaster, change.clone());
        }
        Ok(changes)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StorageError> {
        let inner = self.inner.begin_transaction().await?;
        Ok(Box::new(EventedTransaction {
            inner,
            broadcaster: self.broadcaster.clone(),
        }))
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

/// Transaction wrapper that publishes its changes once the commit lands.
pub struct EventedTransaction {
    inner: Box<dyn Transaction>,
    broadcaster: Arc<EventBroadcaster>,
}

#[async_trait]
impl Transaction for EventedTransaction {
    async fn get(
        &mut self,
        collection: &str,
        id: &str,
    ) -> Result<Option<StoredDocument>, StorageError> {
        self.inner.get(collection, id).await
    }

    fn update(&mut self, collection: &str, id: &str, fields: Value) -> Result<(), StorageError> {
        self.inner.update(collection, id, fields)
    }

    fn delete(&mut self, collection: &str, id: &str) -> Result<(), StorageError> {
        self.inner.delete(collection, id)
    }

    async fn commit(self: Box<Self>) -> Result<Vec<DocumentChange>, StorageError> {
        let changes = self.inner.commit().await?;
        for change in &changes {
            publish(&self.broadcaster, change.clone());
        }
        Ok(changes)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.inner.rollback().await
    }
}
