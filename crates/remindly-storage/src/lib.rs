//! # remindly-storage
//!
//! Document store abstraction for Remindly.
//!
//! This crate defines the traits and types that all storage backends must
//! implement. It does not contain a backend; see `remindly-db-memory`.
//!
//! ## Overview
//!
//! The main trait is [`DocumentStore`], which offers:
//! - single-document create, get, update and delete
//! - conjunctive queries with equality and range predicates
//! - best-effort multi-document batches
//! - optimistic single-document read-modify-write [`Transaction`]s
//!
//! [`EventedStore`] wraps any backend and publishes a [`DocumentEvent`] for
//! every committed change, which is what drives the reactive triggers.

mod error;
pub mod evented;
mod traits;
mod types;

pub use error::StorageError;
pub use evented::{DocumentEvent, EventBroadcaster, EventedStore, EventedTransaction};
pub use traits::{DocumentStore, Transaction};
pub use types::{BatchOp, ChangeKind, DocumentChange, Filter, FilterOp, Query, StoredDocument};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shareable store trait object.
pub type DynStore = std::sync::Arc<dyn DocumentStore>;
