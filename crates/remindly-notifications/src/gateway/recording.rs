use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::{PushGateway, PushMessage, SendResult};
use crate::error::NotificationError;

/// In-memory gateway that keeps every message it was asked to send.
///
/// Can be switched to fail, which still records the attempt.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<PushMessage>>,
    fail: AtomicBool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let gateway = Self::default();
        gateway.set_failing(true);
        gateway
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Every attempted message, in call order.
    pub fn attempts(&self) -> Vec<PushMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    pub fn attempt_count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or_default()
    }
}

#[async_trait]
impl PushGateway for RecordingGateway {
    async fn send(&self, message: &PushMessage) -> Result<SendResult, NotificationError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotificationError::SendFailed(
                "gateway configured to fail".into(),
            ));
        }
        Ok(SendResult::delivered(None))
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
