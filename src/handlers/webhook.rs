use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use utoipa::IntoParams;

use crate::{
    errors::ServiceError,
    models::inbound::WebhookEnvelope,
    webhooks::{authenticate_event, verification::SUBSCRIBE_MODE, verify_challenge, SIGNATURE_HEADER},
    AppState,
};

/// Subscription handshake parameters sent by the channel provider
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VerificationQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

// GET /webhook
#[utoipa::path(
    get,
    path = "/webhook",
    summary = "Webhook subscription handshake",
    params(VerificationQuery),
    responses(
        (status = 200, description = "Challenge echoed", body = String),
        (status = 403, description = "Verify token mismatch, empty body")
    ),
    tag = "Chat"
)]
pub async fn verify_subscription(
    State(state): State<AppState>,
    Query(query): Query<VerificationQuery>,
) -> Response {
    if let Some(mode) = query.mode.as_deref() {
        if mode != SUBSCRIBE_MODE {
            warn!(%mode, "Webhook handshake with unexpected mode");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    match verify_challenge(
        &state.config.verify_token,
        query.verify_token.as_deref(),
        query.challenge.as_deref(),
    ) {
        Ok(challenge) => {
            info!("Webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        Err(_) => StatusCode::FORBIDDEN.into_response(),
    }
}

// POST /webhook
#[utoipa::path(
    post,
    path = "/webhook",
    summary = "Inbound chat events",
    description = "Authenticated by the X-Hub-Signature-256 header. Always acknowledged once authenticated; stale and duplicate events are dropped.",
    request_body = String,
    responses(
        (status = 200, description = "Event acknowledged"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse)
    ),
    tag = "Chat"
)]
pub async fn receive_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    if let Err(e) = authenticate_event(&state.config.channel_app_secret, signature, &body) {
        warn!(error = %e, "Chat event failed authentication");
        return Err(e);
    }

    // The provider retries anything but 200, so unreadable envelopes are acknowledged too
    let envelope = match WebhookEnvelope::from_json(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "Unreadable chat event envelope");
            return Ok(StatusCode::OK);
        }
    };

    let now = Utc::now();
    for event in envelope.into_events(&state.config.host_number, now) {
        let message_id = event.message_id.clone();
        match state.chat_events.handle_event(event, now).await {
            Ok(disposition) => debug!(%message_id, ?disposition, "Chat event handled"),
            Err(e) => error!(%message_id, error = %e, "Chat event handling failed"),
        }
    }

    Ok(StatusCode::OK)
}
