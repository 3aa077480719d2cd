use std::time::Duration;

use crate::state::ConversationState;

/// The keyed, expiring conversation state store. `None` means idle; an expired entry must be indistinguishable from
/// an absent one. Concurrent read-modify-write for the same user resolves as last-write-wins; that is the whole
/// consistency contract, and the dispatcher is written against it.
#[allow(async_fn_in_trait)]
pub trait StateStore: Clone {
    async fn get(&self, user_id: &str) -> Option<ConversationState>;

    async fn save(&self, user_id: &str, state: ConversationState, ttl: Duration);

    async fn clear(&self, user_id: &str);
}
