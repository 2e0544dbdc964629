use axum::{extract::State, http::StatusCode, response::Html};
use bytes::Bytes;
use tracing::{error, info, instrument};

use crate::{errors::ServiceError, services::Effect, AppState};

const RETURN_PAGE: &str = "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Payment received</title></head>\n<body><h1>Thank you!</h1><p>Your payment is being confirmed. You will get a message in the chat once it is done.</p></body></html>\n";

const CANCEL_PAGE: &str = "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Payment canceled</title></head>\n<body><h1>Payment canceled</h1><p>No money was taken. Return to the chat to try again.</p></body></html>\n";

pub fn payment_confirmation_text(order_id: &str) -> String {
    format!(
        "Payment received for order {}. Thank you, we are preparing it now!",
        order_id
    )
}

// GET /payment_return
#[utoipa::path(
    get,
    path = "/payment_return",
    summary = "Landing page after a completed checkout",
    responses((status = 200, description = "Fixed HTML page", body = String, content_type = "text/html")),
    tag = "Payments"
)]
pub async fn payment_return() -> Html<&'static str> {
    Html(RETURN_PAGE)
}

// GET /payment_canceled
#[utoipa::path(
    get,
    path = "/payment_canceled",
    summary = "Landing page after an abandoned checkout",
    responses((status = 200, description = "Fixed HTML page", body = String, content_type = "text/html")),
    tag = "Payments"
)]
pub async fn payment_canceled() -> Html<&'static str> {
    Html(CANCEL_PAGE)
}

// POST /payment_notify
#[utoipa::path(
    post,
    path = "/payment_notify",
    summary = "Gateway payment notification",
    description = "Form-encoded notification. Accepted only after signature, origin and amount checks pass; each order is reconciled at most once.",
    request_body(content = String, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Notification accepted or already handled"),
        (status = 400, description = "Malformed, forged or mismatched notification", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway did not confirm the notification", body = crate::errors::ErrorResponse),
        (status = 500, description = "Order store unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
#[instrument(skip(state, body))]
pub async fn payment_notify(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ServiceError> {
    let accepted = match state.validator.validate(&body).await {
        Ok(accepted) => accepted,
        Err(e) if e.is_benign() => {
            info!(error = %e, "Notification acknowledged without changes");
            return Ok(StatusCode::OK);
        }
        Err(e) => return Err(e),
    };

    let effect = match state.reconciler.reconcile(accepted.order_id(), &accepted).await {
        Ok(effect) => effect,
        Err(e) if e.is_benign() => {
            info!(error = %e, "Notification acknowledged without changes");
            return Ok(StatusCode::OK);
        }
        Err(e) => return Err(e),
    };

    match effect {
        Effect::NotifyUser(session_id) => {
            let text = payment_confirmation_text(accepted.order_id());
            // The order is paid either way; a lost message is not retried
            if let Err(e) = state.channel.send_message(&session_id, &text).await {
                error!(
                    order_id = %accepted.order_id(),
                    error = %e,
                    "Failed to send payment confirmation"
                );
            }
        }
        other => info!(order_id = %accepted.order_id(), effect = ?other, "Notification reconciled"),
    }

    Ok(StatusCode::OK)
}
