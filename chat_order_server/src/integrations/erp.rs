//! The ERP REST client.
//!
//! Implements the engine's business-backend traits against a Frappe-style REST API: documents live under
//! `/api/resource/<DocType>`, responses wrap the document in a `data` field, and whitelisted server methods are
//! called under `/api/method/...`. Authentication is a static `token key:secret` header.
//!
//! Chat user profiles are stored in a `Chat Profile` doctype keyed by the platform user id, customers in the
//! standard `Customer` doctype (looked up by mobile number), and committed orders become `Sales Order` documents.

use std::{sync::Arc, time::Duration};

use chat_order_engine::{
    bot_types::{CatalogItem, CustomerRef, NewOrderRequest, OrderConfirmation, ProfileStatus, UserProfile},
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
use chrono::Utc;
use cog_common::PhoneNumber;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::{config::ErpConfig, errors::ServerError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Error)]
pub enum ErpApiError {
    #[error("ERP request failed. {0}")]
    RequestError(String),
    #[error("Could not deserialize ERP response. {0}")]
    JsonError(String),
    #[error("ERP returned {status}: {message}")]
    QueryError { status: u16, message: String },
}

impl ErpApiError {
    fn is_not_found(&self) -> bool {
        matches!(self, Self::QueryError { status: 404, .. })
    }
}

/// Every Frappe resource response wraps the document(s) in a `data` field.
#[derive(Deserialize)]
struct Doc<T> {
    data: T,
}

#[derive(Clone)]
pub struct ErpApi {
    config: ErpConfig,
    client: Arc<Client>,
}

impl ErpApi {
    pub fn new(config: ErpConfig) -> Result<Self, ServerError> {
        let mut headers = HeaderMap::with_capacity(2);
        let token = format!("token {}:{}", config.api_key, config.api_secret.reveal());
        let val = HeaderValue::from_str(&token).map_err(|e| ServerError::InitializeError(e.to_string()))?;
        headers.insert("Authorization", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ServerError::InitializeError(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<B>,
    ) -> Result<T, ErpApiError> {
        let url = self.url(path);
        trace!("🗄️ Sending ERP query: {method} {url}");
        let mut req = self.client.request(method, url.clone());
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| ErpApiError::RequestError(e.to_string()))?;
        if response.status().is_success() {
            trace!("🗄️ ERP query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| ErpApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| ErpApiError::RequestError(e.to_string()))?;
            Err(ErpApiError::QueryError { status, message })
        }
    }

    async fn fetch_profile_doc(&self, user_id: &str) -> Result<Option<ProfileDoc>, ErpApiError> {
        let path = format!("/api/resource/Chat Profile/{user_id}");
        match self.rest_query::<Doc<ProfileDoc>, ()>(Method::GET, &path, &[], None).await {
            Ok(doc) => Ok(Some(doc.data)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

//--------------------------------------     Documents       ---------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProfileDoc {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    customer_name: Option<String>,
    status: String,
    #[serde(default)]
    last_seen: Option<String>,
}

impl ProfileDoc {
    fn into_profile(self) -> UserProfile {
        let customer = match (self.customer, self.customer_name) {
            (Some(id), name) => Some(CustomerRef { name: name.unwrap_or_else(|| id.clone()), id }),
            (None, _) => None,
        };
        let status = if self.status == "Blocked" { ProfileStatus::Blocked } else { ProfileStatus::Active };
        let last_seen = self
            .last_seen
            .as_deref()
            .and_then(|s| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok())
            .map(|naive| naive.and_utc())
            .unwrap_or_else(Utc::now);
        UserProfile { user_id: self.name, display_name: self.display_name, customer, status, last_seen }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CustomerDoc {
    name: String,
    #[serde(default)]
    customer_name: Option<String>,
}

impl From<CustomerDoc> for CustomerRef {
    fn from(doc: CustomerDoc) -> Self {
        Self { name: doc.customer_name.unwrap_or_else(|| doc.name.clone()), id: doc.name }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ItemDoc {
    item_code: String,
    item_name: String,
    #[serde(default)]
    standard_rate: f64,
    #[serde(default)]
    image: Option<String>,
}

fn status_label(status: ProfileStatus) -> &'static str {
    match status {
        ProfileStatus::Active => "Active",
        ProfileStatus::Blocked => "Blocked",
    }
}

fn now_stamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

//--------------------------------------     Trait impls     ---------------------------------------------------------

impl ProfileStore for ErpApi {
    async fn ensure_profile(&self, user_id: &str, display_name: Option<&str>) -> Result<UserProfile, ProfileError> {
        let existing = self.fetch_profile_doc(user_id).await.map_err(|e| ProfileError::Backend(e.to_string()))?;
        let doc = match existing {
            Some(doc) => {
                let mut update = json!({ "last_seen": now_stamp() });
                if let Some(name) = display_name {
                    update["display_name"] = json!(name);
                }
                let path = format!("/api/resource/Chat Profile/{user_id}");
                self.rest_query::<Doc<ProfileDoc>, Value>(Method::PUT, &path, &[], Some(update))
                    .await
                    .map(|d| d.data)
                    .map_err(|e| ProfileError::Backend(e.to_string()))?
            },
            None => {
                debug!("🗄️ Creating chat profile for user [{user_id}]");
                let new_doc = json!({
                    "name": user_id,
                    "user_id": user_id,
                    "display_name": display_name,
                    "status": "Active",
                    "last_seen": now_stamp(),
                });
                self.rest_query::<Doc<ProfileDoc>, Value>(Method::POST, "/api/resource/Chat Profile", &[], Some(new_doc))
                    .await
                    .map(|d| d.data)
                    .map_err(|e| ProfileError::Backend(e.to_string()))?
            },
        };
        Ok(doc.into_profile())
    }

    async fn set_status(&self, user_id: &str, status: ProfileStatus) -> Result<bool, ProfileError> {
        let doc = self
            .fetch_profile_doc(user_id)
            .await
            .map_err(|e| ProfileError::Backend(e.to_string()))?
            .ok_or_else(|| ProfileError::Backend(format!("No chat profile for user [{user_id}]")))?;
        if doc.status == status_label(status) {
            return Ok(false);
        }
        let path = format!("/api/resource/Chat Profile/{user_id}");
        let update = json!({ "status": status_label(status) });
        self.rest_query::<Doc<ProfileDoc>, Value>(Method::PUT, &path, &[], Some(update))
            .await
            .map_err(|e| ProfileError::Backend(e.to_string()))?;
        Ok(true)
    }

    async fn link_customer(&self, user_id: &str, customer: &CustomerRef) -> Result<(), ProfileError> {
        let path = format!("/api/resource/Chat Profile/{user_id}");
        let update = json!({
            "customer": customer.id,
            "customer_name": customer.name,
            "status": "Active",
        });
        self.rest_query::<Doc<ProfileDoc>, Value>(Method::PUT, &path, &[], Some(update))
            .await
            .map_err(|e| ProfileError::Backend(e.to_string()))?;
        info!("🗄️ Linked user [{user_id}] to customer {} ({})", customer.name, customer.id);
        Ok(())
    }
}

impl CustomerDirectory for ErpApi {
    async fn find_customer_by_phone(&self, phone: &PhoneNumber) -> Result<Option<CustomerRef>, DirectoryError> {
        let filters = json!([["mobile_no", "=", phone.as_str()]]).to_string();
        let fields = json!(["name", "customer_name"]).to_string();
        let params = [("filters", filters), ("fields", fields), ("limit_page_length", "1".to_string())];
        let result = self
            .rest_query::<Doc<Vec<CustomerDoc>>, ()>(Method::GET, "/api/resource/Customer", &params, None)
            .await
            .map_err(|e| DirectoryError::Backend(e.to_string()))?;
        Ok(result.data.into_iter().next().map(Into::into))
    }

    async fn create_customer(&self, name: &str, phone: &PhoneNumber) -> Result<CustomerRef, DirectoryError> {
        let new_doc = json!({
            "customer_name": name,
            "customer_type": "Individual",
            "mobile_no": phone.as_str(),
        });
        let result = self
            .rest_query::<Doc<CustomerDoc>, Value>(Method::POST, "/api/resource/Customer", &[], Some(new_doc))
            .await
            .map_err(|e| match &e {
                ErpApiError::QueryError { status, message } if *status == 417 || *status == 409 => {
                    DirectoryError::CreationRejected(message.clone())
                },
                _ => DirectoryError::Backend(e.to_string()),
            })?;
        info!("🗄️ Created customer {} for phone {}", result.data.name, phone);
        Ok(result.data.into())
    }

    async fn loyalty_points(&self, customer: &CustomerRef, program: &str) -> Result<i64, DirectoryError> {
        #[derive(Deserialize)]
        struct PointsResponse {
            #[serde(default)]
            message: Points,
        }
        #[derive(Deserialize, Default)]
        struct Points {
            #[serde(default)]
            loyalty_points: i64,
        }
        let params = [("customer", customer.id.clone()), ("loyalty_program", program.to_string())];
        let result = self
            .rest_query::<PointsResponse, ()>(
                Method::GET,
                "/api/method/erpnext.accounts.doctype.loyalty_program.loyalty_program.get_loyalty_details",
                &params,
                None,
            )
            .await
            .map_err(|e| DirectoryError::Backend(e.to_string()))?;
        Ok(result.message.loyalty_points)
    }
}

impl CatalogGateway for ErpApi {
    async fn fetch_orderable_items(&self, limit: usize) -> Result<Vec<CatalogItem>, CatalogError> {
        let filters = json!([["disabled", "=", 0], ["is_sales_item", "=", 1]]).to_string();
        let fields = json!(["item_code", "item_name", "standard_rate", "image"]).to_string();
        let params = [
            ("filters", filters),
            ("fields", fields),
            ("order_by", "item_name asc".to_string()),
            ("limit_page_length", limit.to_string()),
        ];
        let result = self
            .rest_query::<Doc<Vec<ItemDoc>>, ()>(Method::GET, "/api/resource/Item", &params, None)
            .await
            .map_err(|e| CatalogError::Backend(e.to_string()))?;
        let items = result
            .data
            .into_iter()
            .map(|doc| CatalogItem {
                code: doc.item_code,
                display_name: doc.item_name,
                price: doc.standard_rate,
                image_ref: doc.image,
            })
            .collect();
        Ok(items)
    }
}

impl OrderBackend for ErpApi {
    async fn create_order(&self, request: &NewOrderRequest) -> Result<OrderConfirmation, OrderBackendError> {
        #[derive(Deserialize)]
        struct SalesOrderDoc {
            name: String,
            #[serde(default)]
            total_qty: f64,
            #[serde(default)]
            grand_total: f64,
            #[serde(default)]
            currency: Option<String>,
        }
        let items = request
            .lines
            .iter()
            .map(|line| json!({ "item_code": line.item_code, "qty": line.qty }))
            .collect::<Vec<Value>>();
        let delivery_date = request.delivery_date.format("%Y-%m-%d").to_string();
        let mut new_doc = json!({
            "customer": request.customer_id,
            "delivery_date": delivery_date,
            "items": items,
        });
        if !request.note.is_empty() {
            new_doc["order_note"] = json!(request.note);
        }
        debug!("🗄️ Creating sales order for customer {} ({} line(s))", request.customer_id, request.lines.len());
        let result = self
            .rest_query::<Doc<SalesOrderDoc>, Value>(Method::POST, "/api/resource/Sales Order", &[], Some(new_doc))
            .await
            .map_err(|e| match &e {
                ErpApiError::QueryError { status, message } if *status == 417 => {
                    OrderBackendError::Rejected(message.clone())
                },
                _ => OrderBackendError::Backend(e.to_string()),
            })?;
        let doc = result.data;
        info!("🗄️ Created sales order {}", doc.name);
        Ok(OrderConfirmation {
            id: doc.name,
            total_qty: doc.total_qty.round() as u32,
            total_amount: doc.grand_total,
            currency: doc.currency.unwrap_or_else(|| "THB".into()),
        })
    }
}
