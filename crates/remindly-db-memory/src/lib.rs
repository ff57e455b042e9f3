//! In-memory document store backend for Remindly.
//!
//! This crate provides an in-memory implementation of the `DocumentStore`
//! trait from `remindly-storage`, including optimistic transactions with
//! per-document versions.
//!
//! # Example
//!
//! ```ignore
//! use remindly_db_memory::InMemoryStore;
//! use remindly_storage::DocumentStore;
//!
//! let store = InMemoryStore::new();
//! let doc = store
//!     .create("schedules", serde_json::json!({"startDate": 1_700_000_000_000_i64}))
//!     .await?;
//! ```

pub mod query;
pub mod storage;
pub mod transaction;

pub use remindly_storage::{DocumentStore, StorageError, StoredDocument};

pub use query::{compare_values, matches_filter, matches_query};
pub use storage::{InMemoryStore, StorageKey};
pub use transaction::{MemoryTransaction, TransactionStats, TransactionStatsSnapshot};

/// Creates a new shareable in-memory store.
pub fn create_store() -> remindly_storage::DynStore {
    std::sync::Arc::new(InMemoryStore::new())
}
