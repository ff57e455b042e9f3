use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{PushGateway, PushMessage, SendResult};
use crate::error::NotificationError;

pub const DEFAULT_FCM_ENDPOINT: &str = "https://fcm.googleapis.com";

/// Connection settings for the FCM HTTP v1 API
#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub endpoint: String,
    pub project_id: String,
    /// OAuth2 bearer token minted outside this process
    pub access_token: String,
    pub timeout: Duration,
}

/// Sends push messages through Firebase Cloud Messaging.
pub struct FcmGateway {
    http_client: Client,
    send_url: String,
    access_token: String,
}

impl FcmGateway {
    pub fn new(config: FcmConfig) -> Result<Self, NotificationError> {
        if config.project_id.is_empty() {
            return Err(NotificationError::InvalidConfig("Missing project_id".into()));
        }
        if config.access_token.is_empty() {
            return Err(NotificationError::InvalidConfig(
                "Missing access_token".into(),
            ));
        }

        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NotificationError::InvalidConfig(e.to_string()))?;

        let send_url = format!(
            "{}/v1/projects/{}/messages:send",
            config.endpoint.trim_end_matches('/'),
            config.project_id
        );

        Ok(Self {
            http_client,
            send_url,
            access_token: config.access_token,
        })
    }

    fn payload(message: &PushMessage) -> serde_json::Value {
        json!({
            "message": {
                "token": message.token,
                "notification": {
                    "title": message.title,
                    "body": message.body
                },
                "data": message.data
            }
        })
    }
}

#[async_trait]
impl PushGateway for FcmGateway {
    async fn send(&self, message: &PushMessage) -> Result<SendResult, NotificationError> {
        let response = self
            .http_client
            .post(&self.send_url)
            .bearer_auth(&self.access_token)
            .json(&Self::payload(message))
            .send()
            .await
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;

        let status = response.status();
        let response_body: serde_json::Value = response.json().await.unwrap_or_default();

        if status.is_success() {
            let message_name = response_body["name"].as_str().map(str::to_string);
            Ok(SendResult::delivered(message_name))
        } else {
            let error = response_body["error"]["message"]
                .as_str()
                .unwrap_or("Unknown error");
            Ok(SendResult::rejected(format!("FCM returned {status}: {error}")))
        }
    }

    fn name(&self) -> &'static str {
        "fcm"
    }
}
