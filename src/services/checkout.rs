use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;
use utoipa::ToSchema;

use crate::config::{MerchantConfig, PAYMENT_CANCEL_PATH, PAYMENT_NOTIFY_PATH, PAYMENT_RETURN_PATH};
use crate::errors::ServiceError;
use crate::services::signature;

/// A completed order handed over by the order flow for payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutOrder {
    pub order_id: String,
    pub chat_session_id: String,
    pub amount: Decimal,
}

/// Parameters of the hosted checkout, immutable once built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CheckoutRequest {
    pub order_id: String,
    pub item_name: String,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub merchant_id: String,
    pub merchant_key: String,
    pub return_url: String,
    pub cancel_url: String,
    pub notify_url: String,
}

fn callback_url(homebase_url: &str, path: &str) -> String {
    format!("{}{}", homebase_url.trim_end_matches('/'), path)
}

fn require(field: &str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::ConfigError(format!(
            "merchant setting '{}' is empty",
            field
        )));
    }
    Ok(())
}

/// Builds the checkout handoff for an order. Pure: the same order and merchant settings
/// always give the same request.
#[instrument(skip(merchant), fields(order_id = %order.order_id))]
pub fn build_checkout(
    order: &CheckoutOrder,
    merchant: &MerchantConfig,
) -> Result<CheckoutRequest, ServiceError> {
    require("merchant_id", &merchant.merchant_id)?;
    require("merchant_key", &merchant.merchant_key)?;
    require("homebase_url", &merchant.homebase_url)?;
    require("item_name_prefix", &merchant.item_name_prefix)?;

    if order.order_id.trim().is_empty() {
        return Err(ServiceError::MalformedPayload(
            "checkout order has no order id".to_string(),
        ));
    }
    if order.amount <= Decimal::ZERO {
        return Err(ServiceError::MalformedPayload(format!(
            "checkout amount for order {} must be positive",
            order.order_id
        )));
    }

    Ok(CheckoutRequest {
        order_id: order.order_id.clone(),
        item_name: format!("{} {}", merchant.item_name_prefix, order.order_id),
        amount: order.amount.round_dp(2),
        merchant_id: merchant.merchant_id.clone(),
        merchant_key: merchant.merchant_key.clone(),
        return_url: callback_url(&merchant.homebase_url, PAYMENT_RETURN_PATH),
        cancel_url: callback_url(&merchant.homebase_url, PAYMENT_CANCEL_PATH),
        notify_url: callback_url(&merchant.homebase_url, PAYMENT_NOTIFY_PATH),
    })
}

impl CheckoutRequest {
    /// Amount as the gateway expects it: two decimal places, dot separator.
    pub fn amount_text(&self) -> String {
        format!("{:.2}", self.amount)
    }

    /// Form fields in the order the gateway documents for its process endpoint.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("merchant_id", self.merchant_id.clone()),
            ("merchant_key", self.merchant_key.clone()),
            ("return_url", self.return_url.clone()),
            ("cancel_url", self.cancel_url.clone()),
            ("notify_url", self.notify_url.clone()),
            ("m_payment_id", self.order_id.clone()),
            ("amount", self.amount_text()),
            ("item_name", self.item_name.clone()),
        ]
    }

    pub fn signature(&self, passphrase: &str) -> String {
        let fields = self.form_fields();
        signature::sign(fields.iter().map(|(k, v)| (*k, v.as_str())), passphrase)
    }

    /// Signed link to the hosted checkout page, suitable for sending in a chat message.
    pub fn redirect_url(&self, process_url: &str, passphrase: &str) -> String {
        let fields = self.form_fields();
        let query = signature::param_string(fields.iter().map(|(k, v)| (*k, v.as_str())));
        format!(
            "{}?{}&{}={}",
            process_url,
            query,
            signature::SIGNATURE_FIELD,
            self.signature(passphrase)
        )
    }
}
