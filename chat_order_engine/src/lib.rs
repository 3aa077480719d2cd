//! Chat Order Engine
//!
//! The platform-agnostic core of the chat order gateway. It turns authenticated webhook events into conversation
//! state transitions and outbound message instructions, and is the only place order-parsing or intent logic lives.
//!
//! The library is divided into three main sections:
//! 1. The data model ([`mod@bot_types`], [`mod@state`]): inbound events, profiles, catalog items, parsed and
//!    pending orders, outbound message instructions, and the TTL-bounded conversation state.
//! 2. The parsing pipeline ([`mod@order_parser`], [`mod@intent`], [`helpers`]): deterministic keyword intent
//!    classification, line-oriented order extraction and safe quantity-expression evaluation.
//! 3. The dispatcher ([`mod@dispatcher`]) and its collaborator contracts ([`mod@traits`]): one inbound event in,
//!    a list of reply/push instructions out, with all business I/O behind traits so every transition is testable
//!    without a network.

pub mod bot_types;
pub mod dispatcher;
pub mod helpers;
pub mod intent;
pub mod order_parser;
pub mod settings;
pub mod state;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use dispatcher::{DispatchError, EventDispatcher};
pub use intent::{Intent, IntentTable};
pub use settings::{BotSettings, Prompts};
pub use state::{ConversationState, InMemoryStateStore};
