//! The chat platform's messaging API client.
//!
//! Implements [`MessageSender`] over the platform's reply and push endpoints. Delivery is fire-and-forget: every
//! failure is logged here and reported to the caller as `false`, never as an error, because by the time a send
//! fails there is usually nothing sensible left to tell the user on that same broken channel.

use std::{sync::Arc, time::Duration};

use chat_order_engine::{
    bot_types::{MessageBody, ReplyToken},
    traits::MessageSender,
};
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use serde_json::{json, Value};

use crate::{config::ChannelConfig, errors::ServerError};

/// Replies and pushes must come back within this window or the user has long since given up waiting.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct ChatApi {
    config: ChannelConfig,
    client: Arc<Client>,
}

impl ChatApi {
    pub fn new(config: ChannelConfig) -> Result<Self, ServerError> {
        if config.access_token.reveal().is_empty() {
            warn!("📱️ No channel access token is configured. Every send will fail.");
        }
        let mut headers = HeaderMap::with_capacity(2);
        let bearer = format!("Bearer {}", config.access_token.reveal());
        let val = HeaderValue::from_str(&bearer).map_err(|e| ServerError::InitializeError(e.to_string()))?;
        headers.insert("Authorization", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| ServerError::InitializeError(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base_url)
    }

    async fn post(&self, path: &str, body: Value) -> bool {
        let url = self.url(path);
        trace!("📱️ Sending chat API request: {url}");
        let response = match self.client.post(&url).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("📱️ Chat API request to {url} failed. {e}");
                return false;
            },
        };
        if response.status().is_success() {
            trace!("📱️ Chat API request successful. {}", response.status());
            true
        } else {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            warn!("📱️ Chat API request to {url} was rejected ({status}). {message}");
            false
        }
    }
}

impl MessageSender for ChatApi {
    async fn reply(&self, token: &ReplyToken, messages: &[MessageBody]) -> bool {
        if messages.is_empty() {
            return true;
        }
        let body = json!({
            "replyToken": token.to_string(),
            "messages": messages.iter().map(to_wire_message).collect::<Vec<Value>>(),
        });
        self.post("/message/reply", body).await
    }

    async fn push(&self, user_id: &str, messages: &[MessageBody]) -> bool {
        if messages.is_empty() {
            return true;
        }
        let body = json!({
            "to": user_id,
            "messages": messages.iter().map(to_wire_message).collect::<Vec<Value>>(),
        });
        self.post("/message/push", body).await
    }
}

/// Platform carousels are capped at this many columns; longer menus are truncated.
const MAX_CARD_ENTRIES: usize = 10;

fn to_wire_message(body: &MessageBody) -> Value {
    match body {
        MessageBody::Text { text } => json!({ "type": "text", "text": text }),
        MessageBody::Image { url } => json!({
            "type": "image",
            "originalContentUrl": url,
            "previewImageUrl": url,
        }),
        MessageBody::Card { title, entries } => {
            let columns = entries
                .iter()
                .take(MAX_CARD_ENTRIES)
                .map(|entry| {
                    let mut column = json!({
                        "title": entry.title,
                        "text": entry.subtitle,
                        "actions": [{
                            "type": "message",
                            "label": "Order",
                            "text": format!("{} qty: 1", entry.title),
                        }],
                    });
                    if let Some(url) = &entry.image_url {
                        column["thumbnailImageUrl"] = json!(url);
                    }
                    column
                })
                .collect::<Vec<Value>>();
            json!({
                "type": "template",
                "altText": title,
                "template": { "type": "carousel", "columns": columns },
            })
        },
    }
}
