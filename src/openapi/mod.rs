use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "chatpay-bridge",
        version = "0.1.0",
        description = r#"
Webhook bridge between a chat channel and a hosted payment gateway.

- `GET /webhook` answers the channel's subscription handshake.
- `POST /webhook` receives signed chat events.
- `POST /payment_notify` receives gateway payment notifications; every order is marked paid at most once.
- `GET /payment_return` and `GET /payment_canceled` are the checkout landing pages.
"#
    ),
    paths(
        crate::handlers::webhook::verify_subscription,
        crate::handlers::webhook::receive_event,
        crate::handlers::payments::payment_return,
        crate::handlers::payments::payment_canceled,
        crate::handlers::payments::payment_notify,
        crate::handlers::health::health_check,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::handlers::health::HealthResponse,
        crate::handlers::health::ComponentStatus,
        crate::models::order::OrderRecord,
        crate::models::order::OrderState,
        crate::services::checkout::CheckoutRequest,
    )),
    tags(
        (name = "Chat", description = "Chat channel webhook"),
        (name = "Payments", description = "Gateway callbacks and landing pages"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;

pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

/// Serves the generated OpenAPI document as JSON.
pub fn openapi_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route(
        OPENAPI_JSON_PATH,
        get(|| async { Json(ApiDoc::openapi()) }),
    )
}
