pub mod inbound;
pub mod order;

pub use inbound::{InboundEvent, MessagePayload, WebhookEnvelope};
pub use order::{OrderRecord, OrderState};
