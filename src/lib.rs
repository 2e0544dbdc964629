//! chatpay-bridge
//!
//! Webhook bridge between a chat channel and a hosted payment gateway: verifies and
//! filters inbound chat events, hands completed orders to the gateway checkout and
//! reconciles the gateway's payment notifications exactly once.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod clients;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod repositories;
pub mod services;
pub mod tracing;
pub mod webhooks;

use axum::{
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

use crate::clients::{ChannelClient, GatewayClient};
use crate::config::{
    AppConfig, PAYMENT_CANCEL_PATH, PAYMENT_NOTIFY_PATH, PAYMENT_RETURN_PATH, WEBHOOK_PATH,
};
use crate::repositories::OrderStore;
use crate::services::{
    ChatEventService, HandoffSettings, NotificationValidator, OrderFlow, Reconciler,
};

/// Upper bound on a single request, gateway confirmation and channel sends included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Present when running against a database; used by the health check
    pub db: Option<Arc<DatabaseConnection>>,
    pub channel: Arc<dyn ChannelClient>,
    pub validator: NotificationValidator,
    pub reconciler: Reconciler,
    pub chat_events: ChatEventService,
}

impl AppState {
    /// Wires the services from their collaborators.
    pub fn new(
        config: Arc<AppConfig>,
        db: Option<Arc<DatabaseConnection>>,
        orders: Arc<dyn OrderStore>,
        channel: Arc<dyn ChannelClient>,
        gateway: Arc<dyn GatewayClient>,
        flow: Arc<dyn OrderFlow>,
    ) -> Self {
        let validator =
            NotificationValidator::new(config.passphrase.clone(), gateway, orders.clone());
        let reconciler = Reconciler::new(orders.clone());
        let chat_events = ChatEventService::new(
            flow,
            channel.clone(),
            orders,
            HandoffSettings {
                merchant: config.merchant(),
                process_url: config.gateway_process_url(),
                passphrase: config.passphrase.clone(),
            },
            config.stale_message_timeout(),
        );

        Self {
            config,
            db,
            channel,
            validator,
            reconciler,
            chat_events,
        }
    }
}

/// Builds the HTTP router with tracing, timeout and request-id layers applied.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route(
            WEBHOOK_PATH,
            get(handlers::webhook::verify_subscription).post(handlers::webhook::receive_event),
        )
        .route(PAYMENT_RETURN_PATH, get(handlers::payments::payment_return))
        .route(PAYMENT_CANCEL_PATH, get(handlers::payments::payment_canceled))
        .route(PAYMENT_NOTIFY_PATH, post(handlers::payments::payment_notify))
        .route("/health", get(handlers::health::health_check))
        .merge(openapi::openapi_routes())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
