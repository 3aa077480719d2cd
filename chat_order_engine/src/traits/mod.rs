//! Collaborator contracts for the chat order engine.
//!
//! Every piece of the outside world the dispatcher touches (the user profile store, the customer directory, the
//! item catalog, the order backend, the outbound message transport and the conversation state store) is defined
//! here as a trait with typed error returns. The engine decides per call whether a failure is user-visible or
//! log-only; nothing in this module performs I/O itself.
//!
//! ## Traits
//! * [`ProfileStore`]: create-or-update chat user profiles and their blocked/active status.
//! * [`CustomerDirectory`]: look up, create and query customers by phone number.
//! * [`CatalogGateway`]: supply the current orderable item list.
//! * [`OrderBackend`]: accept a finalized order and return a confirmation.
//! * [`BotBackend`]: umbrella trait for everything the dispatcher needs from the business backend.
//! * [`MessageSender`]: deliver reply/push payloads to the chat platform.
//! * [`StateStore`]: the expiring per-user conversation state store.

mod backend;
mod message_sender;
mod state_store;

pub use backend::{
    BotBackend,
    CatalogError,
    CatalogGateway,
    CustomerDirectory,
    DirectoryError,
    OrderBackend,
    OrderBackendError,
    ProfileError,
    ProfileStore,
};
pub use message_sender::MessageSender;
pub use state_store::StateStore;
