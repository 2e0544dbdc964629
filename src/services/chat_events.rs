use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::clients::ChannelClient;
use crate::config::MerchantConfig;
use crate::errors::ServiceError;
use crate::models::inbound::InboundEvent;
use crate::models::order::{OrderRecord, OrderState};
use crate::repositories::OrderStore;
use crate::services::checkout::{build_checkout, CheckoutOrder};
use crate::webhooks::{is_stale, RecentMessages};

/// What the conversational order logic wants done with a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    Reply(String),
    /// The conversation produced a complete order that should go to checkout.
    CheckoutReady(CheckoutOrder),
    Nothing,
}

/// The menu and ordering conversation lives behind this trait
#[async_trait]
pub trait OrderFlow: Send + Sync {
    async fn on_message(&self, event: &InboundEvent) -> Result<FlowOutcome, ServiceError>;
}

/// Flow used when no conversation logic is wired in; every message is acknowledged and ignored.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredFlow;

#[async_trait]
impl OrderFlow for UnconfiguredFlow {
    async fn on_message(&self, event: &InboundEvent) -> Result<FlowOutcome, ServiceError> {
        debug!(message_id = %event.message_id, "No order flow configured, ignoring message");
        Ok(FlowOutcome::Nothing)
    }
}

/// What happened to a single inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDisposition {
    Stale,
    Duplicate,
    Replied,
    CheckoutSent { order_id: String },
    Ignored,
}

/// Settings the checkout handoff needs besides the merchant identity
#[derive(Clone, Debug)]
pub struct HandoffSettings {
    pub merchant: MerchantConfig,
    pub process_url: String,
    pub passphrase: String,
}

/// Filters inbound chat events and drives them through the order flow
#[derive(Clone)]
pub struct ChatEventService {
    flow: Arc<dyn OrderFlow>,
    channel: Arc<dyn ChannelClient>,
    orders: Arc<dyn OrderStore>,
    handoff: HandoffSettings,
    stale_after: Duration,
    recent: RecentMessages,
}

impl ChatEventService {
    pub fn new(
        flow: Arc<dyn OrderFlow>,
        channel: Arc<dyn ChannelClient>,
        orders: Arc<dyn OrderStore>,
        handoff: HandoffSettings,
        stale_after: Duration,
    ) -> Self {
        Self {
            flow,
            channel,
            orders,
            handoff,
            stale_after,
            recent: RecentMessages::new(stale_after),
        }
    }

    /// Handles one event. Stale and duplicate events never reach the order flow.
    #[instrument(skip(self, event), fields(message_id = %event.message_id))]
    pub async fn handle_event(
        &self,
        event: InboundEvent,
        now: DateTime<Utc>,
    ) -> Result<EventDisposition, ServiceError> {
        if is_stale(event.delivery_timestamp, now, self.stale_after) {
            counter!("chat.events.dropped", 1, "reason" => "stale");
            info!(
                delivered_at = %event.delivery_timestamp,
                "Dropping stale chat event"
            );
            return Ok(EventDisposition::Stale);
        }

        if !self.recent.first_sighting(&event.message_id, now) {
            counter!("chat.events.dropped", 1, "reason" => "duplicate");
            debug!("Dropping redelivered chat event");
            return Ok(EventDisposition::Duplicate);
        }

        match self.flow.on_message(&event).await? {
            FlowOutcome::Reply(text) => {
                self.channel.send_message(&event.sender_id, &text).await?;
                Ok(EventDisposition::Replied)
            }
            FlowOutcome::CheckoutReady(order) => {
                let order_id = order.order_id.clone();
                self.hand_off(order).await?;
                Ok(EventDisposition::CheckoutSent { order_id })
            }
            FlowOutcome::Nothing => Ok(EventDisposition::Ignored),
        }
    }

    /// Puts the order on file as awaiting payment and sends the signed checkout link.
    async fn hand_off(&self, order: CheckoutOrder) -> Result<(), ServiceError> {
        let checkout = build_checkout(&order, &self.handoff.merchant)?;

        let stored = self
            .orders
            .create_order(OrderRecord::awaiting_payment(
                &checkout.order_id,
                &order.chat_session_id,
                checkout.amount,
            ))
            .await?;

        if stored.state != OrderState::AwaitingPayment || stored.amount != checkout.amount {
            warn!(
                order_id = %stored.order_id,
                state = %stored.state,
                "Order id already on file, not sending another checkout link"
            );
            return Err(ServiceError::Other(anyhow!(
                "order {} is already on file",
                stored.order_id
            )));
        }

        let link = checkout.redirect_url(&self.handoff.process_url, &self.handoff.passphrase);
        let text = format!(
            "Your order {} comes to {}. Pay securely here: {}",
            checkout.order_id,
            checkout.amount_text(),
            link
        );
        self.channel
            .send_message(&order.chat_session_id, &text)
            .await?;

        info!(order_id = %checkout.order_id, "Checkout link sent");
        Ok(())
    }
}
