use metrics::counter;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::clients::GatewayClient;
use crate::errors::ServiceError;
use crate::models::order::OrderRecord;
use crate::repositories::OrderStore;
use crate::services::signature;

pub const ORDER_ID_FIELD: &str = "m_payment_id";
pub const GATEWAY_PAYMENT_ID_FIELD: &str = "pf_payment_id";
pub const AMOUNT_FIELD: &str = "amount_gross";
pub const STATUS_FIELD: &str = "payment_status";

/// Outcome the gateway reports for a payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    Complete,
    Cancelled,
    Other(String),
}

impl PaymentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Complete => "COMPLETE",
            Self::Cancelled => "CANCELLED",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for PaymentStatus {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "COMPLETE" => Self::Complete,
            "CANCELLED" => Self::Cancelled,
            _ => Self::Other(raw.trim().to_string()),
        }
    }
}

/// A payment notification as posted by the gateway.
///
/// `fields` keeps every posted pair in arrival order; the signature and the origin echo
/// are both computed over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentNotification {
    pub order_id: String,
    pub gateway_payment_id: Option<String>,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub signature: String,
    pub fields: Vec<(String, String)>,
}

impl PaymentNotification {
    /// Parses an `application/x-www-form-urlencoded` notification body.
    pub fn from_form(body: &[u8]) -> Result<Self, ServiceError> {
        let fields: Vec<(String, String)> = url::form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let lookup = |name: &str| -> Result<String, ServiceError> {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ServiceError::MalformedPayload(format!("missing field '{}'", name)))
        };

        let order_id = lookup(ORDER_ID_FIELD)?;
        let amount_raw = lookup(AMOUNT_FIELD)?;
        let status = PaymentStatus::from(lookup(STATUS_FIELD)?.as_str());
        let signature = lookup(signature::SIGNATURE_FIELD)?;
        let gateway_payment_id = lookup(GATEWAY_PAYMENT_ID_FIELD).ok();

        let amount = Decimal::from_str(&amount_raw).map_err(|_| {
            ServiceError::MalformedPayload(format!("unparseable amount '{}'", amount_raw))
        })?;

        Ok(Self {
            order_id,
            gateway_payment_id,
            amount,
            status,
            signature,
            fields,
        })
    }

    /// Parameter string over the posted fields, without the signature.
    pub fn param_string(&self) -> String {
        signature::param_string(self.field_pairs())
    }

    pub fn expected_signature(&self, passphrase: &str) -> String {
        signature::sign(self.field_pairs(), passphrase)
    }

    fn field_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A notification that passed every check. Only [`NotificationValidator`] builds one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedNotification {
    notification: PaymentNotification,
    order: OrderRecord,
}

impl AcceptedNotification {
    pub fn order_id(&self) -> &str {
        &self.notification.order_id
    }

    pub fn status(&self) -> &PaymentStatus {
        &self.notification.status
    }

    pub fn amount(&self) -> Decimal {
        self.notification.amount
    }

    pub fn gateway_payment_id(&self) -> Option<&str> {
        self.notification.gateway_payment_id.as_deref()
    }

    /// Order as read during the amount check.
    pub fn order(&self) -> &OrderRecord {
        &self.order
    }

    #[cfg(test)]
    pub(crate) fn for_tests(notification: PaymentNotification, order: OrderRecord) -> Self {
        Self {
            notification,
            order,
        }
    }
}

/// Runs a notification through parse, signature, origin and amount checks in that order
#[derive(Clone)]
pub struct NotificationValidator {
    passphrase: String,
    gateway: Arc<dyn GatewayClient>,
    orders: Arc<dyn OrderStore>,
}

impl NotificationValidator {
    pub fn new(
        passphrase: impl Into<String>,
        gateway: Arc<dyn GatewayClient>,
        orders: Arc<dyn OrderStore>,
    ) -> Self {
        Self {
            passphrase: passphrase.into(),
            gateway,
            orders,
        }
    }

    /// Validates a raw notification body. Nothing is written anywhere by this call.
    #[instrument(skip(self, body), fields(bytes = body.len()))]
    pub async fn validate(&self, body: &[u8]) -> Result<AcceptedNotification, ServiceError> {
        let result = self.run_checks(body).await;

        match &result {
            Ok(accepted) => {
                counter!("payments.notifications.accepted", 1);
                info!(
                    order_id = %accepted.order_id(),
                    status = %accepted.status().as_str(),
                    "Payment notification accepted"
                );
            }
            Err(err) => {
                if let Some(rejection) = err.rejection() {
                    counter!("payments.notifications.rejected", 1, "reason" => rejection.as_str());
                    warn!(reason = rejection.as_str(), error = %err, "Payment notification rejected");
                }
            }
        }

        result
    }

    async fn run_checks(&self, body: &[u8]) -> Result<AcceptedNotification, ServiceError> {
        let notification = PaymentNotification::from_form(body)?;
        debug!(order_id = %notification.order_id, "Notification parsed");

        let expected = notification.expected_signature(&self.passphrase);
        if !signature::signatures_match(&expected, &notification.signature) {
            return Err(ServiceError::BadSignature(notification.order_id));
        }

        // Any failure to get an explicit confirmation counts as unconfirmed
        let confirmed = match self.gateway.confirm(&notification.param_string()).await {
            Ok(confirmed) => confirmed,
            Err(e) => {
                warn!(order_id = %notification.order_id, error = %e, "Gateway confirmation unavailable");
                false
            }
        };
        if !confirmed {
            return Err(ServiceError::UnconfirmedOrigin(notification.order_id));
        }

        let order = self
            .orders
            .get_order(&notification.order_id)
            .await?
            .ok_or_else(|| ServiceError::UnknownOrder(notification.order_id.clone()))?;

        if order.amount != notification.amount {
            return Err(ServiceError::AmountMismatch {
                order_id: notification.order_id,
                expected: order.amount,
                received: notification.amount,
            });
        }

        Ok(AcceptedNotification {
            notification,
            order,
        })
    }
}
