use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint except the subscription handshake
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Bad Request", "Bad Gateway")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

/// Why a payment notification was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MalformedPayload,
    BadSignature,
    UnconfirmedOrigin,
    AmountMismatch,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedPayload => "malformed_payload",
            Self::BadSignature => "bad_signature",
            Self::UnconfirmedOrigin => "unconfirmed_origin",
            Self::AmountMismatch => "amount_mismatch",
        }
    }
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Bad signature for payment notification {0}")]
    BadSignature(String),

    #[error("Gateway did not confirm payment notification {0}")]
    UnconfirmedOrigin(String),

    #[error("Amount mismatch for order {order_id}: expected {expected}, received {received}")]
    AmountMismatch {
        order_id: String,
        expected: Decimal,
        received: Decimal,
    },

    #[error("Unknown order: {0}")]
    UnknownOrder(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl ServiceError {
    /// Returns the rejection category when this error is a notification rejection.
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Self::MalformedPayload(_) => Some(Rejection::MalformedPayload),
            Self::BadSignature(_) => Some(Rejection::BadSignature),
            Self::UnconfirmedOrigin(_) => Some(Rejection::UnconfirmedOrigin),
            Self::AmountMismatch { .. } => Some(Rejection::AmountMismatch),
            _ => None,
        }
    }

    /// True for outcomes the gateway should see as delivered even though nothing changed.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::UnknownOrder(_))
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::MalformedPayload(_) | Self::BadSignature(_) | Self::AmountMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            // The gateway redelivers on non-200, which is what an unconfirmed origin wants
            Self::UnconfirmedOrigin(_) | Self::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            Self::UnknownOrder(_) => StatusCode::OK,
            Self::ConfigError(_)
            | Self::DatabaseError(_)
            | Self::SerializationError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::ConfigError(_) | Self::SerializationError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            Self::AmountMismatch { order_id, .. } => {
                format!("Amount mismatch for order {}", order_id)
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = self.response_message();

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: error_message,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
