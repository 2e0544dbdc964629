/// Outbound collaborators: the chat channel API and the payment gateway
pub mod channel;
pub mod gateway;

pub use channel::{ChannelClient, WhatsAppClient};
pub use gateway::{GatewayClient, HttpGatewayClient};
