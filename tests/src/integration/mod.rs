//! # Integration Tests
//!
//! - `flows`: fallback store purchases driven by listener callbacks
//! - `providers`: provider selection, switching and profile reconciliation

pub mod flows;
pub mod providers;

use std::sync::Arc;
use sw_01_billing::adapters::mock::{
    InMemoryProfileStore, ManualClock, MockNativeStore, MockSubscriptionBackend,
};
use sw_01_billing::{BillingConfig, BillingDependencies, BillingService};

/// A service wired to in-memory ports, with handles to each of them.
pub struct TestApp {
    pub service: Arc<BillingService>,
    pub store: Arc<MockNativeStore>,
    pub backend: Arc<MockSubscriptionBackend>,
    pub profiles: Arc<InMemoryProfileStore>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    /// Both backends wired in; `config` decides which one is selected.
    pub fn new(config: BillingConfig, store_products: &[&str], backend_products: &[&str]) -> Self {
        let store = Arc::new(MockNativeStore::with_products(store_products));
        let backend = Arc::new(MockSubscriptionBackend::with_products(
            backend_products,
            &config.supporter_entitlement_id,
        ));
        let profiles = Arc::new(InMemoryProfileStore::new());
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));

        let service = BillingService::new(
            config,
            BillingDependencies {
                primary: Some(backend.clone()),
                native: Some(store.clone()),
                profiles: profiles.clone(),
                clock: clock.clone(),
            },
        )
        .expect("valid test config");

        Self {
            service: Arc::new(service),
            store,
            backend,
            profiles,
            clock,
        }
    }

    /// No primary credentials, so the native store is selected.
    pub fn fallback(products: &[&str]) -> Self {
        Self::new(BillingConfig::default(), products, &[])
    }

    /// Primary credentials configured.
    pub fn primary(products: &[&str]) -> Self {
        let config = BillingConfig {
            primary_api_key: Some("appl_test_key".to_string()),
            ..BillingConfig::default()
        };
        Self::new(config, &[], products)
    }
}
