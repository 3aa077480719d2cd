use crate::bot_types::{MessageBody, ReplyToken};

/// Outbound message delivery. Fire-and-forget from the dispatcher's point of view: a transport failure is logged by
/// the caller, never surfaced back to the user (the channel may be the thing that is broken). The boolean return
/// exists purely for that logging.
#[allow(async_fn_in_trait)]
pub trait MessageSender {
    /// Deliver messages on the single-use reply channel. The token is consumed whether or not delivery succeeds.
    async fn reply(&self, token: &ReplyToken, messages: &[MessageBody]) -> bool;

    /// Deliver messages on the push channel, addressed directly to a user id.
    async fn push(&self, user_id: &str, messages: &[MessageBody]) -> bool;
}
