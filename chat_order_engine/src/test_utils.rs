//! In-memory fakes for exercising the dispatcher without any collaborators.
//!
//! `FakeBackend` implements every business trait over a mutex-guarded map, with switches to force backend failures
//! so error flows can be driven deterministically.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::Utc;
use cog_common::PhoneNumber;

use crate::{
    bot_types::{
        CatalogItem,
        CustomerRef,
        EventKind,
        InboundEvent,
        NewOrderRequest,
        OrderConfirmation,
        ProfileStatus,
        UserProfile,
    },
    traits::{
        CatalogError,
        CatalogGateway,
        CustomerDirectory,
        DirectoryError,
        OrderBackend,
        OrderBackendError,
        ProfileError,
        ProfileStore,
    },
};

#[derive(Default)]
struct Inner {
    profiles: HashMap<String, UserProfile>,
    customers_by_phone: HashMap<String, CustomerRef>,
    points: HashMap<String, i64>,
    catalog: Vec<CatalogItem>,
    orders: Vec<NewOrderRequest>,
    next_customer_id: u32,
    status_writes: u32,
    fail_orders: bool,
    fail_directory: bool,
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<Mutex<Inner>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_catalog(self, catalog: Vec<CatalogItem>) -> Self {
        self.lock().catalog = catalog;
        self
    }

    pub fn add_customer(&self, phone: &str, id: &str, name: &str) {
        self.lock()
            .customers_by_phone
            .insert(phone.to_string(), CustomerRef { id: id.to_string(), name: name.to_string() });
    }

    pub fn set_points(&self, customer_id: &str, points: i64) {
        self.lock().points.insert(customer_id.to_string(), points);
    }

    pub fn set_fail_orders(&self, fail: bool) {
        self.lock().fail_orders = fail;
    }

    pub fn set_fail_directory(&self, fail: bool) {
        self.lock().fail_directory = fail;
    }

    pub fn created_orders(&self) -> Vec<NewOrderRequest> {
        self.lock().orders.clone()
    }

    pub fn profile(&self, user_id: &str) -> Option<UserProfile> {
        self.lock().profiles.get(user_id).cloned()
    }

    /// Number of status writes that actually changed something. Replayed block/unblock events must not bump this.
    pub fn status_writes(&self) -> u32 {
        self.lock().status_writes
    }
}

impl ProfileStore for FakeBackend {
    async fn ensure_profile(&self, user_id: &str, display_name: Option<&str>) -> Result<UserProfile, ProfileError> {
        let mut inner = self.lock();
        let profile = inner.profiles.entry(user_id.to_string()).or_insert_with(|| UserProfile {
            user_id: user_id.to_string(),
            display_name: None,
            customer: None,
            status: ProfileStatus::Active,
            last_seen: Utc::now(),
        });
        if let Some(name) = display_name {
            profile.display_name = Some(name.to_string());
        }
        profile.last_seen = Utc::now();
        Ok(profile.clone())
    }

    async fn set_status(&self, user_id: &str, status: ProfileStatus) -> Result<bool, ProfileError> {
        let mut inner = self.lock();
        let Some(profile) = inner.profiles.get_mut(user_id) else {
            return Err(ProfileError::Backend(format!("No profile for {user_id}")));
        };
        if profile.status == status {
            return Ok(false);
        }
        profile.status = status;
        inner.status_writes += 1;
        Ok(true)
    }

    async fn link_customer(&self, user_id: &str, customer: &CustomerRef) -> Result<(), ProfileError> {
        let mut inner = self.lock();
        let Some(profile) = inner.profiles.get_mut(user_id) else {
            return Err(ProfileError::Backend(format!("No profile for {user_id}")));
        };
        profile.customer = Some(customer.clone());
        profile.status = ProfileStatus::Active;
        Ok(())
    }
}

impl CustomerDirectory for FakeBackend {
    async fn find_customer_by_phone(&self, phone: &PhoneNumber) -> Result<Option<CustomerRef>, DirectoryError> {
        let inner = self.lock();
        if inner.fail_directory {
            return Err(DirectoryError::Backend("directory offline".into()));
        }
        Ok(inner.customers_by_phone.get(phone.as_str()).cloned())
    }

    async fn create_customer(&self, name: &str, phone: &PhoneNumber) -> Result<CustomerRef, DirectoryError> {
        let mut inner = self.lock();
        if inner.fail_directory {
            return Err(DirectoryError::CreationRejected("directory offline".into()));
        }
        inner.next_customer_id += 1;
        let customer = CustomerRef { id: format!("CUST-{:04}", inner.next_customer_id), name: name.to_string() };
        inner.customers_by_phone.insert(phone.as_str().to_string(), customer.clone());
        Ok(customer)
    }

    async fn loyalty_points(&self, customer: &CustomerRef, _program: &str) -> Result<i64, DirectoryError> {
        Ok(*self.lock().points.get(&customer.id).unwrap_or(&0))
    }
}

impl CatalogGateway for FakeBackend {
    async fn fetch_orderable_items(&self, limit: usize) -> Result<Vec<CatalogItem>, CatalogError> {
        Ok(self.lock().catalog.iter().take(limit).cloned().collect())
    }
}

impl OrderBackend for FakeBackend {
    async fn create_order(&self, request: &NewOrderRequest) -> Result<OrderConfirmation, OrderBackendError> {
        let mut inner = self.lock();
        if inner.fail_orders {
            return Err(OrderBackendError::Backend("order backend offline".into()));
        }
        inner.orders.push(request.clone());
        let total_qty = request.lines.iter().map(|l| l.qty).sum();
        Ok(OrderConfirmation {
            id: format!("SO-{:04}", inner.orders.len()),
            total_qty,
            total_amount: f64::from(total_qty) * 100.0,
            currency: "THB".to_string(),
        })
    }
}

//------------------------------------    Event builders    -------------------------------------------------------

pub fn text_event(user_id: &str, text: &str) -> InboundEvent {
    InboundEvent {
        kind: EventKind::TextMessage(text.to_string()),
        user_id: user_id.to_string(),
        display_name: Some("Test User".to_string()),
        reply_token: Some("reply-token".into()),
        timestamp: Utc::now(),
    }
}

pub fn follow_event(user_id: &str) -> InboundEvent {
    InboundEvent {
        kind: EventKind::Follow,
        user_id: user_id.to_string(),
        display_name: Some("Test User".to_string()),
        reply_token: Some("reply-token".into()),
        timestamp: Utc::now(),
    }
}

pub fn unfollow_event(user_id: &str) -> InboundEvent {
    InboundEvent {
        kind: EventKind::Unfollow,
        user_id: user_id.to_string(),
        display_name: None,
        reply_token: None,
        timestamp: Utc::now(),
    }
}

pub fn item(code: &str, name: &str, price: f64) -> CatalogItem {
    CatalogItem { code: code.into(), display_name: name.into(), price, image_ref: None }
}

pub fn default_catalog() -> Vec<CatalogItem> {
    vec![item("ITM-001", "Bye Heavy", 120.0), item("ITM-002", "Green Hug", 95.0), item("ITM-003", "Glow Skin", 150.0)]
}
