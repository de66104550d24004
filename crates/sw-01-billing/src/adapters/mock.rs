//! In-memory implementations of the outbound ports.
//!
//! Used by unit tests, the integration suite and the app shell's demo mode.
//! Each mock records the calls made on it and exposes toggles to inject
//! failures.

use crate::domain::{EntitlementUpdate, ProductId, ProfileRecord, TransactionId, UserId};
use crate::ports::{
    BackendError, Clock, CustomerInfo, NativeStore, Offering, Offerings, Package,
    ProfileStore, ProfileStoreError, PurchaseListener, PurchaseUpdate, StoreError, StoreProduct,
    StoreTransaction, SubscriptionBackend,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

// =============================================================================
// Native store
// =============================================================================

#[derive(Default)]
struct StoreState {
    connected: bool,
    connect_calls: usize,
    products: Vec<StoreProduct>,
    history: Vec<StoreTransaction>,
    delivered_on_connect: Vec<PurchaseUpdate>,
    responses: VecDeque<PurchaseUpdate>,
    purchase_calls: Vec<ProductId>,
    finished: Vec<(TransactionId, bool)>,
    fail_connect: bool,
    fail_products: bool,
    fail_purchase: bool,
    fail_finish: bool,
}

/// Listener-based store that delivers updates only when told to.
#[derive(Default)]
pub struct MockNativeStore {
    state: Mutex<StoreState>,
    listener: Mutex<Option<Arc<dyn PurchaseListener>>>,
}

impl MockNativeStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that sells the given product ids.
    pub fn with_products(ids: &[&str]) -> Self {
        let store = Self::new();
        for id in ids {
            store.add_product(StoreProduct::new(*id));
        }
        store
    }

    /// Add a purchasable product.
    pub fn add_product(&self, product: StoreProduct) {
        self.state.lock().products.push(product);
    }

    /// Add a record returned by `get_purchase_history`.
    pub fn add_history(&self, transaction: StoreTransaction) {
        self.state.lock().history.push(transaction);
    }

    /// Deliver `update` to the listener during the next `connect()`, like a
    /// store redelivering unfinished transactions from a previous session.
    pub fn deliver_on_connect(&self, update: PurchaseUpdate) {
        self.state.lock().delivered_on_connect.push(update);
    }

    /// Deliver `update` to the listener from inside the next `purchase_item`.
    pub fn respond_to_next_purchase(&self, update: PurchaseUpdate) {
        self.state.lock().responses.push_back(update);
    }

    /// Make `connect()` fail.
    pub fn fail_connect(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    /// Make `get_products()` fail.
    pub fn fail_products(&self, fail: bool) {
        self.state.lock().fail_products = fail;
    }

    /// Make `purchase_item()` fail.
    pub fn fail_purchase(&self, fail: bool) {
        self.state.lock().fail_purchase = fail;
    }

    /// Make `finish_transaction()` fail.
    pub fn fail_finish(&self, fail: bool) {
        self.state.lock().fail_finish = fail;
    }

    /// Push an update to the installed listener. Returns false when no
    /// listener is installed.
    pub async fn emit(&self, update: PurchaseUpdate) -> bool {
        let listener = self.listener.lock().clone();
        match listener {
            Some(listener) => {
                listener.on_purchase_update(update).await;
                true
            }
            None => false,
        }
    }

    /// Yield until `purchase_item` has been called `n` times.
    pub async fn wait_for_purchase_calls(&self, n: usize) {
        while self.state.lock().purchase_calls.len() < n {
            tokio::task::yield_now().await;
        }
    }

    /// How many times a transaction was finished.
    pub fn finish_count(&self, transaction_id: &str) -> usize {
        self.state
            .lock()
            .finished
            .iter()
            .filter(|(id, _)| id.as_str() == transaction_id)
            .count()
    }

    /// Every successful finish with its consume flag, in order.
    pub fn finished(&self) -> Vec<(TransactionId, bool)> {
        self.state.lock().finished.clone()
    }

    /// Products passed to `purchase_item`, in order.
    pub fn purchase_calls(&self) -> Vec<ProductId> {
        self.state.lock().purchase_calls.clone()
    }

    /// Whether a listener is installed.
    pub fn listener_installed(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Whether the connection is open.
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Number of `connect()` calls.
    pub fn connect_calls(&self) -> usize {
        self.state.lock().connect_calls
    }
}

#[async_trait]
impl NativeStore for MockNativeStore {
    async fn connect(&self) -> Result<(), StoreError> {
        let redelivered = {
            let mut state = self.state.lock();
            state.connect_calls += 1;
            if state.fail_connect {
                return Err(StoreError::new(3, "billing unavailable"));
            }
            state.connected = true;
            std::mem::take(&mut state.delivered_on_connect)
        };

        for update in redelivered {
            self.emit(update).await;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        self.state.lock().connected = false;
        Ok(())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<StoreProduct>, StoreError> {
        let state = self.state.lock();
        if state.fail_products {
            return Err(StoreError::new(2, "network unavailable"));
        }
        Ok(state
            .products
            .iter()
            .filter(|p| ids.contains(&p.product_id))
            .cloned()
            .collect())
    }

    async fn purchase_item(&self, product_id: &ProductId) -> Result<(), StoreError> {
        let response = {
            let mut state = self.state.lock();
            if state.fail_purchase {
                return Err(StoreError::new(6, "purchase sheet failed"));
            }
            state.purchase_calls.push(product_id.clone());
            state.responses.pop_front()
        };

        if let Some(update) = response {
            self.emit(update).await;
        }
        Ok(())
    }

    async fn finish_transaction(
        &self,
        transaction: &StoreTransaction,
        consume: bool,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.fail_finish {
            return Err(StoreError::new(8, "item not owned"));
        }
        state
            .finished
            .push((transaction.transaction_id.clone(), consume));
        Ok(())
    }

    async fn get_purchase_history(&self) -> Result<Vec<StoreTransaction>, StoreError> {
        Ok(self.state.lock().history.clone())
    }

    fn set_purchase_listener(&self, listener: Arc<dyn PurchaseListener>) {
        *self.listener.lock() = Some(listener);
    }

    fn remove_purchase_listener(&self) {
        self.listener.lock().take();
    }
}

// =============================================================================
// Subscription backend
// =============================================================================

#[derive(Default)]
struct BackendState {
    api_key: Option<String>,
    user: Option<UserId>,
    packages: Vec<Package>,
    active: BTreeSet<String>,
    granted_on_purchase: BTreeSet<String>,
    purchased: Vec<String>,
    log_out_calls: usize,
    fail_configure: bool,
    fail_offerings: bool,
    next_purchase_error: Option<BackendError>,
}

/// Request/response backend with a single offering.
#[derive(Default)]
pub struct MockSubscriptionBackend {
    state: Mutex<BackendState>,
}

impl MockSubscriptionBackend {
    /// Backend with no packages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose current offering sells the given product ids, each
    /// granting `entitlement` when bought.
    pub fn with_products(ids: &[&str], entitlement: &str) -> Self {
        let backend = Self::new();
        {
            let mut state = backend.state.lock();
            for id in ids {
                state.packages.push(Package {
                    identifier: format!("${}", id),
                    product: StoreProduct::new(*id),
                });
            }
            state.granted_on_purchase.insert(entitlement.to_string());
        }
        backend
    }

    /// Mark an entitlement active as if bought in an earlier session.
    pub fn grant(&self, entitlement: &str) {
        self.state.lock().active.insert(entitlement.to_string());
    }

    /// Make `configure()` fail.
    pub fn fail_configure(&self, fail: bool) {
        self.state.lock().fail_configure = fail;
    }

    /// Make `get_offerings()` fail.
    pub fn fail_offerings(&self, fail: bool) {
        self.state.lock().fail_offerings = fail;
    }

    /// Fail the next `purchase_package()` with `error`.
    pub fn fail_next_purchase(&self, error: BackendError) {
        self.state.lock().next_purchase_error = Some(error);
    }

    /// Key passed to `configure()`.
    pub fn api_key(&self) -> Option<String> {
        self.state.lock().api_key.clone()
    }

    /// User passed to the last `log_in()`, cleared by `log_out()`.
    pub fn logged_in_user(&self) -> Option<UserId> {
        self.state.lock().user.clone()
    }

    /// Package identifiers bought, in order.
    pub fn purchased(&self) -> Vec<String> {
        self.state.lock().purchased.clone()
    }

    /// Number of `log_out()` calls.
    pub fn log_out_calls(&self) -> usize {
        self.state.lock().log_out_calls
    }

    fn customer_info(state: &BackendState) -> CustomerInfo {
        CustomerInfo {
            active_entitlements: state.active.clone(),
            original_app_user_id: state.user.as_ref().map(|u| u.to_string()),
        }
    }
}

#[async_trait]
impl SubscriptionBackend for MockSubscriptionBackend {
    async fn configure(&self, api_key: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if state.fail_configure {
            return Err(BackendError::new("CONFIGURATION_ERROR", "invalid api key"));
        }
        state.api_key = Some(api_key.to_string());
        Ok(())
    }

    async fn get_offerings(&self) -> Result<Offerings, BackendError> {
        let state = self.state.lock();
        if state.fail_offerings {
            return Err(BackendError::new("NETWORK_ERROR", "offerings unavailable"));
        }
        Ok(Offerings {
            current: Some(Offering {
                identifier: "default".to_string(),
                packages: state.packages.clone(),
            }),
        })
    }

    async fn purchase_package(&self, package: &Package) -> Result<CustomerInfo, BackendError> {
        let mut state = self.state.lock();
        if let Some(error) = state.next_purchase_error.take() {
            return Err(error);
        }
        state.purchased.push(package.identifier.clone());
        let granted = state.granted_on_purchase.clone();
        state.active.extend(granted);
        Ok(Self::customer_info(&state))
    }

    async fn restore_purchases(&self) -> Result<CustomerInfo, BackendError> {
        Ok(Self::customer_info(&self.state.lock()))
    }

    async fn get_customer_info(&self) -> Result<CustomerInfo, BackendError> {
        Ok(Self::customer_info(&self.state.lock()))
    }

    async fn log_in(&self, user_id: &UserId) -> Result<CustomerInfo, BackendError> {
        let mut state = self.state.lock();
        state.user = Some(user_id.clone());
        Ok(Self::customer_info(&state))
    }

    async fn log_out(&self) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.user = None;
        state.log_out_calls += 1;
        Ok(())
    }
}

// =============================================================================
// Profile store
// =============================================================================

#[derive(Default)]
struct ProfileState {
    profiles: HashMap<UserId, ProfileRecord>,
    updates: Vec<EntitlementUpdate>,
    fail_fetch: bool,
    fail_update: bool,
}

/// Profile table kept in memory. Applies updates the way the remote table
/// does: an absent `supporter_since` never clears the column.
#[derive(Default)]
pub struct InMemoryProfileStore {
    state: Mutex<ProfileState>,
}

impl InMemoryProfileStore {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a profile row.
    pub fn insert(&self, user_id: impl Into<UserId>, record: ProfileRecord) {
        self.state.lock().profiles.insert(user_id.into(), record);
    }

    /// Current row for a user.
    pub fn get(&self, user_id: &UserId) -> Option<ProfileRecord> {
        self.state.lock().profiles.get(user_id).cloned()
    }

    /// Every update applied, in order.
    pub fn updates(&self) -> Vec<EntitlementUpdate> {
        self.state.lock().updates.clone()
    }

    /// Make `fetch_profile()` fail.
    pub fn fail_fetch(&self, fail: bool) {
        self.state.lock().fail_fetch = fail;
    }

    /// Make `update_supporter()` fail.
    pub fn fail_update(&self, fail: bool) {
        self.state.lock().fail_update = fail;
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn fetch_profile(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ProfileRecord>, ProfileStoreError> {
        let state = self.state.lock();
        if state.fail_fetch {
            return Err(ProfileStoreError::Unavailable("connection refused".into()));
        }
        Ok(state.profiles.get(user_id).cloned())
    }

    async fn update_supporter(&self, update: &EntitlementUpdate) -> Result<(), ProfileStoreError> {
        let mut state = self.state.lock();
        if state.fail_update {
            return Err(ProfileStoreError::Query("permission denied".into()));
        }

        let record = state.profiles.entry(update.user_id.clone()).or_default();
        record.is_supporter = Some(update.is_supporter);
        if let Some(since) = update.supporter_since {
            record.supporter_since = Some(since);
        }
        record.updated_at = Some(update.updated_at);

        state.updates.push(update.clone());
        Ok(())
    }
}

// =============================================================================
// Clock
// =============================================================================

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Clock frozen at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
