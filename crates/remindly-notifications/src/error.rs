use remindly_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid record {collection}/{id}: {message}")]
    InvalidRecord {
        collection: String,
        id: String,
        message: String,
    },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transaction on {0} gave up after {1} conflicting attempts")]
    TransactionExhausted(String, u32),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NotificationError {
    pub fn invalid_record(
        collection: impl Into<String>,
        id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidRecord {
            collection: collection.into(),
            id: id.into(),
            message: message.into(),
        }
    }
}
