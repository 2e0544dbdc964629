use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::errors::ServiceError;

/// Outbound half of the chat channel
#[async_trait]
pub trait ChannelClient: Send + Sync {
    async fn send_message(&self, session_id: &str, text: &str) -> Result<(), ServiceError>;
}

/// Sends text messages through the WhatsApp Cloud API
#[derive(Clone)]
pub struct WhatsAppClient {
    client: reqwest::Client,
    messages_url: String,
    token: String,
}

impl WhatsAppClient {
    pub fn new(
        api_base_url: &str,
        phone_id: &str,
        token: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::ConfigError(format!("channel HTTP client: {}", e)))?;

        Ok(Self {
            client,
            messages_url: format!("{}/{}/messages", api_base_url.trim_end_matches('/'), phone_id),
            token: token.into(),
        })
    }
}

#[async_trait]
impl ChannelClient for WhatsAppClient {
    #[instrument(skip(self, text))]
    async fn send_message(&self, session_id: &str, text: &str) -> Result<(), ServiceError> {
        let body = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": session_id,
            "type": "text",
            "text": { "preview_url": true, "body": text },
        });

        let response = self
            .client
            .post(&self.messages_url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("channel send: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            info!("Chat message delivered to channel API");
            return Ok(());
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            // Expired or revoked access tokens land here; rotating them is an operator task
            error!(%status, "Channel API rejected the access token; outbound messages are failing");
        } else {
            warn!(%status, "Channel API refused the message");
        }

        Err(ServiceError::ExternalServiceError(format!(
            "channel API responded with {}",
            status
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn sends_text_message_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/PN-1/messages"))
            .and(bearer_token("wa-token"))
            .and(body_partial_json(json!({
                "to": "27820000000",
                "type": "text",
                "text": {"body": "Payment received"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messages": [{"id": "wamid.x"}]})))
            .expect(1)
            .mount(&server)
            .await;

        let client = WhatsAppClient::new(&server.uri(), "PN-1", "wa-token").unwrap();
        client
            .send_message("27820000000", "Payment received")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn expired_token_surfaces_as_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = WhatsAppClient::new(&server.uri(), "PN-1", "stale").unwrap();
        let result = client.send_message("27820000000", "hi").await;
        assert!(matches!(result, Err(ServiceError::ExternalServiceError(msg)) if msg.contains("401")));
    }
}
