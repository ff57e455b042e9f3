//! Core types for the document store abstraction layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// A document as persisted by a storage backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Collection the document lives in.
    pub collection: String,

    /// Store-assigned document ID.
    pub id: String,

    /// Monotonic per-document version, bumped on every write.
    ///
    /// Transactions use this to detect conflicting writes.
    pub version: u64,

    /// The document fields as a JSON object.
    pub data: Value,

    /// When the document was last written.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl StoredDocument {
    /// Returns the value of a top-level field, if present.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

/// What a single write did to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Before/after image of one committed write.
///
/// Backends return these from every mutating call so that wrappers such as
/// [`crate::EventedStore`] can publish accurate change events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChange {
    pub collection: String,
    pub id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

impl DocumentChange {
    pub fn created(collection: impl Into<String>, id: impl Into<String>, after: Value) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            before: None,
            after: Some(after),
        }
    }

    pub fn updated(
        collection: impl Into<String>,
        id: impl Into<String>,
        before: Value,
        after: Value,
    ) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn deleted(collection: impl Into<String>, id: impl Into<String>, before: Value) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            before: Some(before),
            after: None,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match (&self.before, &self.after) {
            (None, _) => ChangeKind::Created,
            (Some(_), Some(_)) => ChangeKind::Updated,
            (Some(_), None) => ChangeKind::Deleted,
        }
    }
}

/// Comparison operator for a query filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "==",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
        }
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single `field <op> value` predicate on a top-level document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

/// A conjunction of filters with an optional result limit.
///
/// # Example
///
/// ```
/// use remindly_storage::Query;
///
/// let query = Query::new()
///     .where_eq("status", "pending")
///     .where_le("notificationTime", 1_700_000_000_000_i64)
///     .with_limit(1);
/// assert_eq!(query.filters.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_filter(field, FilterOp::Eq, value)
    }

    pub fn where_lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_filter(field, FilterOp::Lt, value)
    }

    pub fn where_le(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_filter(field, FilterOp::Le, value)
    }

    pub fn where_gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_filter(field, FilterOp::Gt, value)
    }

    pub fn where_ge(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_filter(field, FilterOp::Ge, value)
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One operation inside a multi-document batch commit.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    /// Merge the given top-level fields into an existing document.
    Update {
        collection: String,
        id: String,
        fields: Value,
    },
    /// Remove a document. Missing documents are skipped.
    Delete { collection: String, id: String },
}

impl BatchOp {
    pub fn delete(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Delete {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn update(collection: impl Into<String>, id: impl Into<String>, fields: Value) -> Self {
        Self::Update {
            collection: collection.into(),
            id: id.into(),
            fields,
        }
    }
}
