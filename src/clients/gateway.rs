use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::errors::ServiceError;

const VALID_RESPONSE: &str = "VALID";

/// Server-to-server confirmation against the payment gateway
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Echoes a notification's parameter string back to the gateway.
    ///
    /// `Ok(true)` only when the gateway answers with an explicit `VALID`.
    async fn confirm(&self, param_string: &str) -> Result<bool, ServiceError>;
}

/// Confirms notifications against the gateway's validate endpoint over HTTPS
#[derive(Clone)]
pub struct HttpGatewayClient {
    client: reqwest::Client,
    validate_url: String,
}

impl HttpGatewayClient {
    /// The timeout bounds the whole confirmation round trip.
    pub fn new(validate_url: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ServiceError::ConfigError(format!("gateway HTTP client: {}", e)))?;

        Ok(Self {
            client,
            validate_url: validate_url.into(),
        })
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    #[instrument(skip(self, param_string), fields(url = %self.validate_url))]
    async fn confirm(&self, param_string: &str) -> Result<bool, ServiceError> {
        let response = self
            .client
            .post(&self.validate_url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(param_string.to_string())
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Gateway confirmation request failed");
                ServiceError::ExternalServiceError(format!("gateway confirmation: {}", e))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("gateway confirmation: {}", e)))?;

        let confirmed = status.is_success() && body.trim() == VALID_RESPONSE;
        debug!(%status, confirmed, "Gateway confirmation answered");
        Ok(confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer, timeout: Duration) -> HttpGatewayClient {
        HttpGatewayClient::new(format!("{}/eng/query/validate", server.uri()), timeout).unwrap()
    }

    #[tokio::test]
    async fn valid_answer_confirms_and_echoes_param_string() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/eng/query/validate"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("m_payment_id=ORD-42&amount_gross=100.00"))
            .respond_with(ResponseTemplate::new(200).set_body_string("VALID"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(2)).await;
        let confirmed = client
            .confirm("m_payment_id=ORD-42&amount_gross=100.00")
            .await
            .unwrap();
        assert!(confirmed);
    }

    #[tokio::test]
    async fn anything_but_valid_is_not_confirmed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("INVALID"))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(2)).await;
        assert!(!client.confirm("a=1").await.unwrap());
    }

    #[tokio::test]
    async fn non_success_status_is_not_confirmed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("VALID"))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(2)).await;
        assert!(!client.confirm("a=1").await.unwrap());
    }

    #[tokio::test]
    async fn slow_gateway_times_out_as_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("VALID")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_millis(100)).await;
        let result = client.confirm("a=1").await;
        assert!(matches!(result, Err(ServiceError::ExternalServiceError(_))));
    }
}
