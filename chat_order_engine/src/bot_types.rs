use std::fmt::Display;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

//--------------------------------------     ReplyToken      ---------------------------------------------------------
/// A single-use handle tied to one inbound event. The chat platform accepts at most one reply per token; anything
/// the bot wants to say after the token is consumed has to go out on the push channel instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyToken(pub String);

impl Display for ReplyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for ReplyToken {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

//--------------------------------------     InboundEvent    ---------------------------------------------------------
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Follow,
    Unfollow,
    /// A text message. The payload is the raw, untrimmed text as the user typed it.
    TextMessage(String),
    /// A non-text message (sticker, image, location...). Only bookkeeping is done for these.
    OtherMessage,
}

/// One webhook event, as handed to the dispatcher by the transport layer. Ephemeral: it is processed exactly once
/// and never persisted by the engine.
#[derive(Clone, Debug)]
pub struct InboundEvent {
    pub kind: EventKind,
    pub user_id: String,
    pub display_name: Option<String>,
    pub reply_token: Option<ReplyToken>,
    pub timestamp: DateTime<Utc>,
}

impl InboundEvent {
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            EventKind::TextMessage(t) => Some(t.as_str()),
            _ => None,
        }
    }
}

//--------------------------------------     UserProfile     ---------------------------------------------------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileStatus {
    Active,
    Blocked,
}

/// A reference to a customer record in the ERP. The engine never owns customer storage; it only carries the id and
/// display name around for linkage and user-facing summaries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRef {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: Option<String>,
    pub customer: Option<CustomerRef>,
    pub status: ProfileStatus,
    pub last_seen: DateTime<Utc>,
}

impl UserProfile {
    pub fn is_linked(&self) -> bool {
        self.customer.is_some()
    }
}

//--------------------------------------     CatalogItem     ---------------------------------------------------------
/// One orderable item as supplied by the catalog gateway. Read-only from the engine's perspective and fetched fresh
/// on every dispatch cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub code: String,
    pub display_name: String,
    pub price: f64,
    pub image_ref: Option<String>,
}

//--------------------------------------     Parsed orders   ---------------------------------------------------------
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineError {
    UnknownItem,
    InvalidQuantity,
}

/// The outcome of parsing a single input line that carried a quantity marker. Lines without a marker never produce
/// one of these; they are simply not order lines.
#[derive(Clone, Debug)]
pub struct ParsedOrderLine {
    pub raw_line: String,
    pub matched_item: Option<CatalogItem>,
    pub quantity: Option<u32>,
    pub error: Option<LineError>,
}

impl ParsedOrderLine {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ParsedOrder {
    pub lines: Vec<ParsedOrderLine>,
    pub note: String,
    /// True if at least one line carried a quantity marker, whether or not it parsed cleanly. This is the signal
    /// that the user was trying to place an order at all.
    pub has_quantity_marker: bool,
}

impl ParsedOrder {
    pub fn valid_lines(&self) -> impl Iterator<Item = &ParsedOrderLine> {
        self.lines.iter().filter(|l| l.is_valid())
    }

    pub fn unknown_items(&self) -> impl Iterator<Item = &ParsedOrderLine> {
        self.lines.iter().filter(|l| l.error == Some(LineError::UnknownItem))
    }

    pub fn invalid_quantities(&self) -> impl Iterator<Item = &ParsedOrderLine> {
        self.lines.iter().filter(|l| l.error == Some(LineError::InvalidQuantity))
    }

    pub fn has_valid_lines(&self) -> bool {
        self.lines.iter().any(|l| l.is_valid())
    }
}

//--------------------------------------     PendingOrder    ---------------------------------------------------------
/// A validated order line, ready to be committed to the order backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item_code: String,
    pub title: String,
    pub qty: u32,
}

/// An order that parsed cleanly but has not been committed yet; it lives in conversation state while the bot waits
/// for confirmation and/or customer linkage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub customer: Option<CustomerRef>,
    pub lines: Vec<OrderLine>,
    #[serde(default)]
    pub note: String,
    pub needs_customer: bool,
}

impl PendingOrder {
    pub fn total_qty(&self) -> u32 {
        self.lines.iter().map(|l| l.qty).sum()
    }
}

//--------------------------------------     Order backend   ---------------------------------------------------------
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub customer_id: String,
    pub lines: Vec<OrderLine>,
    pub note: String,
    pub delivery_date: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub id: String,
    pub total_qty: u32,
    pub total_amount: f64,
    pub currency: String,
}

//--------------------------------------     Outbound        ---------------------------------------------------------
/// Which channel an outbound message must travel on. Replies consume the event's single-use token; pushes address
/// the user id directly and can be sent at any time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Channel {
    Reply(ReplyToken),
    Push(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CardEntry {
    pub title: String,
    pub subtitle: String,
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    Text { text: String },
    Image { url: String },
    Card { title: String, entries: Vec<CardEntry> },
}

/// An instruction to send one message. The dispatcher returns these instead of performing network I/O itself, which
/// keeps every state transition deterministic and testable.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundMessage {
    pub channel: Channel,
    pub body: MessageBody,
}

impl OutboundMessage {
    pub fn reply_text(token: ReplyToken, text: impl Into<String>) -> Self {
        Self { channel: Channel::Reply(token), body: MessageBody::Text { text: text.into() } }
    }

    pub fn push_text(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { channel: Channel::Push(user_id.into()), body: MessageBody::Text { text: text.into() } }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text { text } => Some(text.as_str()),
            _ => None,
        }
    }
}
