#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use chatpay_bridge::{
    app_router,
    clients::{ChannelClient, HttpGatewayClient},
    config::{load_from, AppConfig},
    errors::ServiceError,
    models::inbound::InboundEvent,
    repositories::InMemoryOrderStore,
    services::{signature, FlowOutcome, OrderFlow, UnconfiguredFlow},
    AppState,
};
use config::{Config, File, FileFormat};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const VERIFY_TOKEN: &str = "verify-me";
pub const APP_SECRET: &str = "app-secret";
pub const HOST_NUMBER: &str = "27000000000";
pub const PASSPHRASE: &str = "jt7NOE43FZPn";
pub const CUSTOMER: &str = "27820000000";
pub const VALIDATE_PATH: &str = "/eng/query/validate";

/// Channel double that records every outbound message
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingChannel {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelClient for RecordingChannel {
    async fn send_message(&self, session_id: &str, text: &str) -> Result<(), ServiceError> {
        self.sent
            .lock()
            .unwrap()
            .push((session_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Order flow double that answers every message with a fixed outcome and records what it saw
pub struct ScriptedFlow {
    outcome: FlowOutcome,
    seen: Mutex<Vec<InboundEvent>>,
}

impl ScriptedFlow {
    pub fn new(outcome: FlowOutcome) -> Self {
        Self {
            outcome,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<InboundEvent> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderFlow for ScriptedFlow {
    async fn on_message(&self, event: &InboundEvent) -> Result<FlowOutcome, ServiceError> {
        self.seen.lock().unwrap().push(event.clone());
        Ok(self.outcome.clone())
    }
}

pub fn test_config(gateway_host: &str) -> AppConfig {
    let toml = format!(
        r#"
        port = 18080
        verify_token = "{VERIFY_TOKEN}"
        channel_app_secret = "{APP_SECRET}"
        channel_api_token = "wa-token"
        phone_id = "1234567890"
        host_number = "{HOST_NUMBER}"
        database_url = "sqlite::memory:"
        homebase_url = "https://bot.example.com"
        merchant_id = "10000100"
        merchant_key = "46f0cd694581a"
        passphrase = "{PASSPHRASE}"
        gateway_host = "{gateway_host}"
        gateway_timeout_secs = 2
    "#
    );
    let builder = Config::builder().add_source(File::from_str(&toml, FileFormat::Toml));
    load_from(builder, "test").expect("test config should load")
}

/// Helper harness: the full router over an in-memory order store, a recording channel
/// and a wiremock gateway.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub orders: Arc<InMemoryOrderStore>,
    pub channel: Arc<RecordingChannel>,
    pub gateway: MockServer,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_flow(Arc::new(UnconfiguredFlow)).await
    }

    pub async fn with_flow(flow: Arc<dyn OrderFlow>) -> Self {
        let gateway = MockServer::start().await;
        let config = test_config(&gateway.uri());

        let orders = Arc::new(InMemoryOrderStore::new());
        let channel = Arc::new(RecordingChannel::default());
        let gateway_client = HttpGatewayClient::new(
            config.gateway_validate_url(),
            config.gateway_timeout(),
        )
        .expect("gateway client");

        let state = AppState::new(
            Arc::new(config),
            None,
            orders.clone(),
            channel.clone(),
            Arc::new(gateway_client),
            flow,
        );

        Self {
            router: app_router(state.clone()),
            state,
            orders,
            channel,
            gateway,
        }
    }

    /// Makes the gateway validate endpoint answer every confirmation with `body`.
    pub async fn gateway_answers(&self, body: &str) {
        Mock::given(method("POST"))
            .and(path(VALIDATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
            .mount(&self.gateway)
            .await;
    }

    pub async fn gateway_calls(&self) -> usize {
        self.gateway
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    pub async fn send_raw(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router never fails")
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.send_raw(request).await;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, String) {
        self.send(
            Request::builder()
                .method(Method::GET)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_notification(&self, body: String) -> (StatusCode, String) {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri("/payment_notify")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    pub async fn post_event(&self, body: &str, signature: Option<&str>) -> (StatusCode, String) {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/webhook")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            request = request.header("x-hub-signature-256", signature);
        }
        self.send(request.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn post_signed_event(&self, body: &str) -> (StatusCode, String) {
        let signature = sign_event(body);
        self.post_event(body, Some(&signature)).await
    }
}

pub fn sign_event(body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(APP_SECRET.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Provider envelope carrying one text message delivered at `timestamp` (unix seconds).
pub fn text_event(message_id: &str, text: &str, timestamp: i64) -> String {
    let envelope: Value = json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "102290129340398",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": HOST_NUMBER,
                        "phone_number_id": "1234567890"
                    },
                    "contacts": [{ "profile": { "name": "Thandi" }, "wa_id": CUSTOMER }],
                    "messages": [{
                        "from": CUSTOMER,
                        "id": message_id,
                        "timestamp": timestamp.to_string(),
                        "type": "text",
                        "text": { "body": text }
                    }]
                }
            }]
        }]
    });
    envelope.to_string()
}

/// Form body of a gateway notification, signed with `passphrase`.
pub fn notification_body(pairs: &[(&str, &str)], passphrase: &str) -> String {
    let sig = signature::sign(pairs.iter().copied(), passphrase);
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        form.append_pair(key, value);
    }
    form.append_pair("signature", &sig);
    form.finish()
}

pub fn itn_fields<'a>(order_id: &'a str, amount: &'a str, status: &'a str) -> Vec<(&'a str, &'a str)> {
    vec![
        ("m_payment_id", order_id),
        ("pf_payment_id", "1089250"),
        ("payment_status", status),
        ("item_name", "Order ORD-42"),
        ("amount_gross", amount),
        ("amount_fee", "-2.30"),
        ("amount_net", "97.70"),
        ("merchant_id", "10000100"),
    ]
}

pub fn signed_itn(order_id: &str, amount: &str, status: &str) -> String {
    notification_body(&itn_fields(order_id, amount, status), PASSPHRASE)
}
