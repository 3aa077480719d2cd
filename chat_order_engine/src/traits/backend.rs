use cog_common::PhoneNumber;
use thiserror::Error;

use crate::bot_types::{CatalogItem, CustomerRef, NewOrderRequest, OrderConfirmation, ProfileStatus, UserProfile};

#[derive(Debug, Clone, Error)]
pub enum ProfileError {
    #[error("Profile backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    #[error("Customer directory error: {0}")]
    Backend(String),
    #[error("Customer creation rejected: {0}")]
    CreationRejected(String),
}

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Catalog gateway error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Error)]
pub enum OrderBackendError {
    #[error("Order backend error: {0}")]
    Backend(String),
    #[error("Order rejected: {0}")]
    Rejected(String),
}

/// Chat user profiles: one record per platform user id, owned by the business backend. The engine only reads and
/// updates status, display name and customer linkage.
#[allow(async_fn_in_trait)]
pub trait ProfileStore {
    /// Create the profile if it does not exist, refresh the display name and last-seen timestamp either way, and
    /// return the current record.
    async fn ensure_profile(&self, user_id: &str, display_name: Option<&str>) -> Result<UserProfile, ProfileError>;

    /// Set the profile status. Returns true if the status actually changed, so callers can keep blocked/unblocked
    /// transitions idempotent.
    async fn set_status(&self, user_id: &str, status: ProfileStatus) -> Result<bool, ProfileError>;

    /// Link the profile to a customer record and mark it active.
    async fn link_customer(&self, user_id: &str, customer: &CustomerRef) -> Result<(), ProfileError>;
}

/// Customer records in the ERP, keyed by phone number.
#[allow(async_fn_in_trait)]
pub trait CustomerDirectory {
    async fn find_customer_by_phone(&self, phone: &PhoneNumber) -> Result<Option<CustomerRef>, DirectoryError>;

    async fn create_customer(&self, name: &str, phone: &PhoneNumber) -> Result<CustomerRef, DirectoryError>;

    /// Current loyalty point balance for the customer under the given program.
    async fn loyalty_points(&self, customer: &CustomerRef, program: &str) -> Result<i64, DirectoryError>;
}

/// The current orderable item list, filtered to items flagged orderable and ordered by display name. Fetched per
/// dispatch cycle, never cached by the engine.
#[allow(async_fn_in_trait)]
pub trait CatalogGateway {
    async fn fetch_orderable_items(&self, limit: usize) -> Result<Vec<CatalogItem>, CatalogError>;
}

/// The order management collaborator. Receives a finalized, validated order and either commits it or fails; a
/// failure leaves the user's pending state untouched so the order can be retried without re-entry.
#[allow(async_fn_in_trait)]
pub trait OrderBackend {
    async fn create_order(&self, request: &NewOrderRequest) -> Result<OrderConfirmation, OrderBackendError>;
}

/// Everything the dispatcher needs from the business backend, as one bound. `Clone` because the server hands one
/// instance to each worker.
pub trait BotBackend: ProfileStore + CustomerDirectory + CatalogGateway + OrderBackend + Clone {}

impl<T> BotBackend for T where T: ProfileStore + CustomerDirectory + CatalogGateway + OrderBackend + Clone {}
