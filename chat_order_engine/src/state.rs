//! Conversation state and the in-memory TTL store.
//!
//! State is ephemeral by design: at most one entry per user, bounded by a TTL, and an expired entry behaves
//! identically to no entry. `Idle` is represented by absence: the store hands back `Option<ConversationState>` and
//! `None` means there is nothing pending, which makes "expired" and "never existed" the same case by construction.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::bot_types::PendingOrder;

/// How long a registration conversation survives without input.
pub const REGISTRATION_TTL: Duration = Duration::from_secs(3600);
/// How long an unconfirmed order waits for 'confirm' or 'cancel'.
pub const PENDING_ORDER_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ConversationState {
    /// Waiting for the user to send a 10-digit phone number. `pending` carries an order that arrived before the
    /// user was linked to a customer record; it resumes once linkage succeeds.
    AwaitingPhone {
        name: Option<String>,
        pending: Option<PendingOrder>,
    },
    /// An order that parsed cleanly and awaits an explicit 'confirm' or 'cancel'.
    PendingOrder(PendingOrder),
}

impl ConversationState {
    /// The TTL this state should be saved with.
    pub fn ttl(&self) -> Duration {
        match self {
            ConversationState::AwaitingPhone { .. } => REGISTRATION_TTL,
            ConversationState::PendingOrder(_) => PENDING_ORDER_TTL,
        }
    }
}

/// A mutex-guarded map with per-entry deadlines. Expired entries are dropped lazily on read and swept on write.
/// Concurrent dispatches for the same user race benignly: last writer wins, which is the only consistency contract
/// the conversation flow relies on.
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    entries: Arc<Mutex<HashMap<String, StateEntry>>>,
}

#[derive(Clone)]
struct StateEntry {
    state: ConversationState,
    expires_at: Instant,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl crate::traits::StateStore for InMemoryStateStore {
    async fn get(&self, user_id: &str) -> Option<ConversationState> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(user_id) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.state.clone()),
            Some(_) => {
                entries.remove(user_id);
                None
            },
            None => None,
        }
    }

    async fn save(&self, user_id: &str, state: ConversationState, ttl: Duration) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(user_id.to_string(), StateEntry { state, expires_at: now + ttl });
    }

    async fn clear(&self, user_id: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(user_id);
    }
}
