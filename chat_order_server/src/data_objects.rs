//! Wire representations of webhook deliveries.
//!
//! The chat platform posts a JSON envelope containing a batch of events. These structs mirror that format exactly
//! (camelCase, stringly-typed event kinds) and get converted into the engine's [`InboundEvent`] at the edge, so
//! nothing platform-specific leaks past this module.

use std::fmt::Display;

use chat_order_engine::bot_types::{EventKind, InboundEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub source: Option<EventSource>,
    #[serde(default)]
    pub message: Option<EventMessage>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl WebhookEvent {
    /// Convert the wire event into the engine's event type. Returns `None` for event kinds the bot does not react
    /// to at all (delivery receipts, joins to group chats, and whatever the platform adds next).
    pub fn to_inbound(&self) -> Option<InboundEvent> {
        let kind = match self.event_type.as_str() {
            "follow" => EventKind::Follow,
            "unfollow" => EventKind::Unfollow,
            "message" => match &self.message {
                Some(m) if m.message_type == "text" => {
                    EventKind::TextMessage(m.text.clone().unwrap_or_default())
                },
                Some(_) => EventKind::OtherMessage,
                None => return None,
            },
            _ => return None,
        };
        let user_id = self.source.as_ref().and_then(|s| s.user_id.clone()).unwrap_or_default();
        let timestamp = self
            .timestamp
            .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms))
            .unwrap_or_else(Utc::now);
        Some(InboundEvent {
            kind,
            user_id,
            display_name: None,
            reply_token: self.reply_token.clone().map(Into::into),
            timestamp,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn text_message_event_deserializes() {
        let json = r#"{
            "destination": "Uxxx",
            "events": [{
                "type": "message",
                "replyToken": "rt-1",
                "source": { "type": "user", "userId": "U123" },
                "message": { "id": "m1", "type": "text", "text": "Green Hug qty: 2" },
                "timestamp": 1718000000000
            }]
        }"#;
        let payload: WebhookPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.events.len(), 1);
        let event = payload.events[0].to_inbound().unwrap();
        assert_eq!(event.user_id, "U123");
        assert_eq!(event.text(), Some("Green Hug qty: 2"));
        assert_eq!(event.reply_token.as_ref().unwrap().to_string(), "rt-1");
    }

    #[test]
    fn sticker_message_becomes_other() {
        let json = r#"{
            "type": "message",
            "source": { "type": "user", "userId": "U123" },
            "message": { "type": "sticker" }
        }"#;
        let event: WebhookEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.to_inbound().unwrap().kind, EventKind::OtherMessage);
    }

    #[test]
    fn unknown_event_kinds_are_dropped() {
        let json = r#"{ "type": "postback", "source": { "type": "user", "userId": "U123" } }"#;
        let event: WebhookEvent = serde_json::from_str(json).unwrap();
        assert!(event.to_inbound().is_none());
    }

    #[test]
    fn missing_user_id_yields_empty_string() {
        let json = r#"{ "type": "follow", "source": { "type": "group" } }"#;
        let event: WebhookEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.to_inbound().unwrap().user_id, "");
    }

    #[test]
    fn empty_payload_has_no_events() {
        let payload: WebhookPayload = serde_json::from_str("{}").unwrap();
        assert!(payload.events.is_empty());
    }
}
