use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Lifecycle of a chat order as far as payment correlation is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Pending,
    AwaitingPayment,
    Paid,
    Canceled,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AwaitingPayment => "awaiting_payment",
            Self::Paid => "paid",
            Self::Canceled => "canceled",
        }
    }

    /// Paid is terminal; nothing moves an order out of it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid)
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "awaiting_payment" => Ok(Self::AwaitingPayment),
            "paid" => Ok(Self::Paid),
            "canceled" => Ok(Self::Canceled),
            other => Err(format!("unknown order state '{}'", other)),
        }
    }
}

/// The correlation record kept for every order handed to the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrderRecord {
    pub order_id: String,
    /// Chat session (sender id) the order was placed from
    pub chat_session_id: String,
    /// Checkout amount on file, compared against the notified amount
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub state: OrderState,
    pub created_at: DateTime<Utc>,
}

impl OrderRecord {
    pub fn awaiting_payment(
        order_id: impl Into<String>,
        chat_session_id: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            chat_session_id: chat_session_id.into(),
            amount,
            state: OrderState::AwaitingPayment,
            created_at: Utc::now(),
        }
    }
}
