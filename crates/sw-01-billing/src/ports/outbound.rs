//! # Outbound Ports
//!
//! Traits for the billing backends, the profile store and the clock, plus
//! the payload shapes those backends define.

use crate::domain::{
    EntitlementUpdate, ProductId, ProfileRecord, TransactionId, TransactionOutcome, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

// =============================================================================
// Subscription backend (primary)
// =============================================================================

/// Error returned by the subscription backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("backend error {code}: {message}")]
pub struct BackendError {
    /// Backend error code.
    pub code: String,
    /// Human readable message.
    pub message: String,
    /// Set when the user dismissed the purchase sheet.
    pub user_cancelled: bool,
}

impl BackendError {
    /// Generic backend failure.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            user_cancelled: false,
        }
    }

    /// The distinguished cancellation error.
    pub fn cancelled() -> Self {
        Self {
            code: "PURCHASE_CANCELLED".to_string(),
            message: "purchase was cancelled".to_string(),
            user_cancelled: true,
        }
    }
}

/// A purchasable product as described by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreProduct {
    /// Product identifier.
    pub product_id: ProductId,
    /// Display title.
    pub title: String,
    /// Localized price string.
    pub price: String,
}

impl StoreProduct {
    /// Product with placeholder display fields.
    pub fn new(product_id: impl Into<ProductId>) -> Self {
        let product_id = product_id.into();
        Self {
            title: product_id.to_string(),
            price: String::new(),
            product_id,
        }
    }
}

/// Package inside an offering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Package identifier (e.g. `$rc_monthly`).
    pub identifier: String,
    /// Product sold by this package.
    pub product: StoreProduct,
}

/// A set of packages presented together.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Offering {
    /// Offering identifier.
    pub identifier: String,
    /// Packages in display order.
    pub packages: Vec<Package>,
}

impl Offering {
    /// Package selling the given product.
    pub fn package_for(&self, product_id: &ProductId) -> Option<&Package> {
        self.packages
            .iter()
            .find(|p| &p.product.product_id == product_id)
    }
}

/// Offerings configured on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Offerings {
    /// The offering currently presented to users.
    pub current: Option<Offering>,
}

/// Entitlement state after a backend call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CustomerInfo {
    /// Ids of active entitlements.
    pub active_entitlements: BTreeSet<String>,
    /// Backend user id.
    pub original_app_user_id: Option<String>,
}

impl CustomerInfo {
    /// Whether the named entitlement is active.
    pub fn has_active(&self, entitlement_id: &str) -> bool {
        self.active_entitlements.contains(entitlement_id)
    }

    /// Whether any entitlement is active.
    pub fn has_any_active(&self) -> bool {
        !self.active_entitlements.is_empty()
    }
}

/// Request/response subscription billing backend - outbound port.
#[async_trait]
pub trait SubscriptionBackend: Send + Sync {
    /// Configure the SDK with an API key.
    async fn configure(&self, api_key: &str) -> Result<(), BackendError>;

    /// Fetch offerings.
    async fn get_offerings(&self) -> Result<Offerings, BackendError>;

    /// Buy a package. Resolves with the post-purchase customer info.
    async fn purchase_package(&self, package: &Package) -> Result<CustomerInfo, BackendError>;

    /// Restore previous purchases.
    async fn restore_purchases(&self) -> Result<CustomerInfo, BackendError>;

    /// Current customer info.
    async fn get_customer_info(&self) -> Result<CustomerInfo, BackendError>;

    /// Identify the backend customer as an app user.
    async fn log_in(&self, user_id: &UserId) -> Result<CustomerInfo, BackendError>;

    /// Return to an anonymous customer.
    async fn log_out(&self) -> Result<(), BackendError>;
}

// =============================================================================
// Native store (fallback)
// =============================================================================

/// Error returned by the native store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("store error {code}: {message}")]
pub struct StoreError {
    /// Store response code.
    pub code: i32,
    /// Human readable message.
    pub message: String,
}

impl StoreError {
    /// Create a store error.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A transaction record delivered by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreTransaction {
    /// Product bought.
    pub product_id: ProductId,
    /// Store transaction id.
    pub transaction_id: TransactionId,
    /// Whether the transaction was already finished.
    pub acknowledged: bool,
    /// Purchase time, when reported.
    pub purchased_at: Option<DateTime<Utc>>,
}

impl StoreTransaction {
    /// Unacknowledged transaction with no purchase time.
    pub fn new(product_id: impl Into<ProductId>, transaction_id: impl Into<TransactionId>) -> Self {
        Self {
            product_id: product_id.into(),
            transaction_id: transaction_id.into(),
            acknowledged: false,
            purchased_at: None,
        }
    }

    /// Mark as already acknowledged.
    pub fn acknowledged(mut self) -> Self {
        self.acknowledged = true;
        self
    }
}

/// Response code attached to a listener update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseCode {
    /// Transactions completed.
    Ok,
    /// User dismissed the purchase sheet.
    UserCancelled,
    /// Awaiting external approval.
    Deferred,
    /// Store failure.
    Error(i32),
}

impl ResponseCode {
    /// Outcome carried to pending callers. `Deferred` settles nothing.
    pub fn outcome(&self) -> Option<TransactionOutcome> {
        match self {
            ResponseCode::Ok => Some(TransactionOutcome::Success),
            ResponseCode::UserCancelled => Some(TransactionOutcome::UserCancelled),
            ResponseCode::Deferred => None,
            ResponseCode::Error(code) => Some(TransactionOutcome::Error(*code)),
        }
    }
}

/// One invocation of the store's purchase listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseUpdate {
    /// Response code for the whole update.
    pub code: ResponseCode,
    /// Zero or more transaction records.
    pub results: Vec<StoreTransaction>,
}

impl PurchaseUpdate {
    /// Successful update carrying transactions.
    pub fn ok(results: Vec<StoreTransaction>) -> Self {
        Self {
            code: ResponseCode::Ok,
            results,
        }
    }

    /// User cancelled.
    pub fn cancelled() -> Self {
        Self {
            code: ResponseCode::UserCancelled,
            results: Vec::new(),
        }
    }

    /// Store error.
    pub fn error(code: i32) -> Self {
        Self {
            code: ResponseCode::Error(code),
            results: Vec::new(),
        }
    }
}

/// Callback installed on the native store.
#[async_trait]
pub trait PurchaseListener: Send + Sync {
    /// Handle one update from the store.
    async fn on_purchase_update(&self, update: PurchaseUpdate);
}

/// Listener-based native store - outbound port.
#[async_trait]
pub trait NativeStore: Send + Sync {
    /// Open the billing connection. The store may deliver pending
    /// transactions to the listener as soon as this is called.
    async fn connect(&self) -> Result<(), StoreError>;

    /// Close the billing connection.
    async fn disconnect(&self) -> Result<(), StoreError>;

    /// Fetch product metadata.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<StoreProduct>, StoreError>;

    /// Show the purchase sheet. The outcome arrives on the listener.
    async fn purchase_item(&self, product_id: &ProductId) -> Result<(), StoreError>;

    /// Acknowledge (and optionally consume) a transaction.
    async fn finish_transaction(
        &self,
        transaction: &StoreTransaction,
        consume: bool,
    ) -> Result<(), StoreError>;

    /// Past purchases for restore.
    async fn get_purchase_history(&self) -> Result<Vec<StoreTransaction>, StoreError>;

    /// Install the process-wide purchase listener, replacing any previous one.
    fn set_purchase_listener(&self, listener: Arc<dyn PurchaseListener>);

    /// Remove the purchase listener.
    fn remove_purchase_listener(&self);
}

// =============================================================================
// Profile store
// =============================================================================

/// Profile store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProfileStoreError {
    /// Store unreachable.
    #[error("profile store unavailable: {0}")]
    Unavailable(String),
    /// Query rejected.
    #[error("profile query failed: {0}")]
    Query(String),
}

/// Remote profile table - outbound port.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// `select is_supporter, supporter_since, updated_at from profiles where id = user_id`
    async fn fetch_profile(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ProfileRecord>, ProfileStoreError>;

    /// `update profiles set ... where id = user_id`. A `None`
    /// `supporter_since` leaves the column untouched.
    async fn update_supporter(&self, update: &EntitlementUpdate) -> Result<(), ProfileStoreError>;
}

// =============================================================================
// Clock
// =============================================================================

/// Time source for testability
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// System time implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
