use async_trait::async_trait;
use tracing::info;

use super::{PushGateway, PushMessage, SendResult};
use crate::error::NotificationError;

/// Dry-run gateway that logs every message and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogGateway;

impl LogGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PushGateway for LogGateway {
    async fn send(&self, message: &PushMessage) -> Result<SendResult, NotificationError> {
        info!(
            title = %message.title,
            body = %message.body,
            data = ?message.data,
            "Push message (dry run)"
        );
        Ok(SendResult::delivered(None))
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
