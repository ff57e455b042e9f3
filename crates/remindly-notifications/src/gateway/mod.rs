pub mod fcm;
pub mod log;
pub mod recording;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NotificationError;

/// Result of handing a message to a push gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    pub success: bool,
    pub external_id: Option<String>,
    pub error: Option<String>,
}

impl SendResult {
    pub fn delivered(external_id: Option<String>) -> Self {
        Self {
            success: true,
            external_id,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            external_id: None,
            error: Some(error.into()),
        }
    }
}

/// A push notification ready to send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

/// Transport that delivers push messages to devices.
///
/// Either an `Err` or a result with `success == false` counts as a failed
/// send. Failed sends are never retried by the delivery executor.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<SendResult, NotificationError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

pub use fcm::{FcmConfig, FcmGateway};
pub use log::LogGateway;
pub use recording::RecordingGateway;
