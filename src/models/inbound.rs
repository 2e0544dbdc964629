use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::errors::ServiceError;

/// What the user actually sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePayload {
    Text(String),
    /// Button or list selection from an interactive message
    Reply { id: String, title: String },
    /// Media, location, reactions and other kinds the order flow does not consume
    Unsupported(String),
}

/// A single chat message lifted out of the provider envelope; evaluated, never stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub sender_id: String,
    pub message_id: String,
    pub message_payload: MessagePayload,
    pub received_at: DateTime<Utc>,
    pub delivery_timestamp: DateTime<Utc>,
}

// Provider envelope, kept to the fields the bridge reads.

#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: String,
    pub value: ChangeValue,
}

#[derive(Debug, Deserialize)]
pub struct ChangeValue {
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
pub struct Metadata {
    pub display_phone_number: Option<String>,
    pub phone_number_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawMessage {
    pub from: String,
    pub id: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<TextBody>,
    pub interactive: Option<Interactive>,
    pub button: Option<QuickReplyButton>,
}

#[derive(Debug, Deserialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct Interactive {
    pub button_reply: Option<ReplyChoice>,
    pub list_reply: Option<ReplyChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyChoice {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct QuickReplyButton {
    pub payload: String,
    pub text: String,
}

impl RawMessage {
    fn payload(&self) -> MessagePayload {
        match self.kind.as_str() {
            "text" => match &self.text {
                Some(text) => MessagePayload::Text(text.body.clone()),
                None => MessagePayload::Unsupported(self.kind.clone()),
            },
            "interactive" => {
                let choice = self
                    .interactive
                    .as_ref()
                    .and_then(|i| i.button_reply.as_ref().or(i.list_reply.as_ref()));
                match choice {
                    Some(choice) => MessagePayload::Reply {
                        id: choice.id.clone(),
                        title: choice.title.clone(),
                    },
                    None => MessagePayload::Unsupported(self.kind.clone()),
                }
            }
            "button" => match &self.button {
                Some(button) => MessagePayload::Reply {
                    id: button.payload.clone(),
                    title: button.text.clone(),
                },
                None => MessagePayload::Unsupported(self.kind.clone()),
            },
            other => MessagePayload::Unsupported(other.to_string()),
        }
    }
}

/// Parses a unix-seconds timestamp as sent by the provider.
pub fn parse_delivery_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let secs: i64 = raw.trim().parse().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

impl WebhookEnvelope {
    /// Decodes a raw event body.
    pub fn from_json(body: &[u8]) -> Result<Self, ServiceError> {
        serde_json::from_slice(body)
            .map_err(|e| ServiceError::SerializationError(format!("chat event envelope: {}", e)))
    }

    /// Flattens the envelope into message events addressed to `host_number`.
    ///
    /// Delivery receipts carry no messages and yield nothing. Messages with an unreadable
    /// timestamp are skipped: without it the staleness filter cannot judge them.
    pub fn into_events(self, host_number: &str, received_at: DateTime<Utc>) -> Vec<InboundEvent> {
        let mut events = Vec::new();

        for change in self.entry.into_iter().flat_map(|e| e.changes) {
            if change.field != "messages" {
                continue;
            }

            let addressed_to = change
                .value
                .metadata
                .as_ref()
                .and_then(|m| m.display_phone_number.as_deref());
            if let Some(number) = addressed_to {
                if number != host_number {
                    warn!(to = %number, "Ignoring event addressed to another business number");
                    continue;
                }
            }

            for message in change.value.messages {
                let Some(delivery_timestamp) = parse_delivery_timestamp(&message.timestamp) else {
                    warn!(message_id = %message.id, "Skipping message with unreadable timestamp");
                    continue;
                };

                events.push(InboundEvent {
                    message_payload: message.payload(),
                    sender_id: message.from,
                    message_id: message.id,
                    received_at,
                    delivery_timestamp,
                });
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(messages: serde_json::Value, display_number: &str) -> WebhookEnvelope {
        serde_json::from_value(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "WABA-1",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": {
                            "display_phone_number": display_number,
                            "phone_number_id": "PN-1"
                        },
                        "messages": messages
                    }
                }]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn text_and_reply_messages_become_events() {
        let now = Utc::now();
        let env = envelope(
            json!([
                {"from": "2782", "id": "wamid.1", "timestamp": "1700000000", "type": "text",
                 "text": {"body": "menu"}},
                {"from": "2782", "id": "wamid.2", "timestamp": "1700000005", "type": "interactive",
                 "interactive": {"type": "button_reply", "button_reply": {"id": "checkout", "title": "Pay now"}}}
            ]),
            "27000000000",
        );

        let events = env.into_events("27000000000", now);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message_payload, MessagePayload::Text("menu".into()));
        assert_eq!(events[0].delivery_timestamp.timestamp(), 1_700_000_000);
        assert_eq!(events[0].received_at, now);
        assert_eq!(
            events[1].message_payload,
            MessagePayload::Reply {
                id: "checkout".into(),
                title: "Pay now".into()
            }
        );
    }

    #[test]
    fn events_for_other_numbers_are_ignored() {
        let env = envelope(
            json!([{"from": "2782", "id": "wamid.1", "timestamp": "1700000000", "type": "text",
                    "text": {"body": "hi"}}]),
            "27999999999",
        );
        assert!(env.into_events("27000000000", Utc::now()).is_empty());
    }

    #[test]
    fn status_only_changes_and_bad_timestamps_yield_nothing() {
        let statuses: WebhookEnvelope = serde_json::from_value(json!({
            "object": "whatsapp_business_account",
            "entry": [{"changes": [{"field": "messages", "value": {"statuses": [{"id": "wamid.9"}]}}]}]
        }))
        .unwrap();
        assert!(statuses.into_events("27000000000", Utc::now()).is_empty());

        let bad = envelope(
            json!([{"from": "2782", "id": "wamid.1", "timestamp": "soon", "type": "image"}]),
            "27000000000",
        );
        assert!(bad.into_events("27000000000", Utc::now()).is_empty());
    }

    #[test]
    fn unreadable_body_is_a_serialization_error() {
        assert!(matches!(
            WebhookEnvelope::from_json(b"not json"),
            Err(ServiceError::SerializationError(msg)) if msg.contains("chat event envelope")
        ));
        assert!(WebhookEnvelope::from_json(br#"{"object":"whatsapp_business_account","entry":[]}"#).is_ok());
    }
}
