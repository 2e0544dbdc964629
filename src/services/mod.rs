// Gateway handoff
pub mod checkout;
pub mod signature;

// Payment notifications
pub mod notification;
pub mod reconciliation;

// Inbound chat
pub mod chat_events;

pub use chat_events::{
    ChatEventService, EventDisposition, FlowOutcome, HandoffSettings, OrderFlow, UnconfiguredFlow,
};
pub use checkout::{build_checkout, CheckoutOrder, CheckoutRequest};
pub use notification::{AcceptedNotification, NotificationValidator, PaymentNotification, PaymentStatus};
pub use reconciliation::{Effect, Reconciler};
