//! SW-01 Billing - supporter purchase coordinator for StrayWatch.
//!
//! Reconciles purchase outcomes that arrive on a platform-wide store
//! listener with the purchase call that triggered them, across two
//! interchangeable billing backends.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    BillingService (BillingApi)               │
//! │   initialize · purchase_product · restore · has_supporter    │
//! ├──────────────────────────────┬───────────────────────────────┤
//! │       ProviderSelector       │     EntitlementReconciler     │
//! │  Primary > Fallback > None   │  supporter flag → profiles    │
//! ├──────────────┬───────────────┴───────────────────────────────┤
//! │   Primary    │               Fallback                        │
//! │ (offerings,  │  purchase_item ─┐        ┌─ store listener     │
//! │  sync call)  │                 ▼        ▼                     │
//! │              │      Pending Transaction Registry              │
//! │              │   (productId → oneshot, timeout, sweeper)      │
//! └──────────────┴────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use sw_01_billing::{BillingApi, BillingConfig, BillingDependencies, BillingService};
//!
//! let service = BillingService::new(BillingConfig::from_env(), deps)?;
//! let result = service.purchase_product(&"supporter.monthly".into(), Some(&user)).await;
//! ```
//!
//! # Guarantees
//!
//! - At most one adapter is active; switching needs `disconnect()`
//! - A pending purchase is settled exactly once
//! - Unacknowledged store transactions are finished exactly once, with or
//!   without a waiting caller
//! - `supporter_since` is written once and never overwritten

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

// Re-exports for public API
pub use adapters::{
    BillingAdapter, FallbackBillingAdapter, PendingTransactionRegistry, PrimaryBillingAdapter,
};
pub use domain::config::{BillingConfig, ConfigError};
pub use domain::error::{BillingError, BillingResult};
pub use domain::types::*;
pub use domain::RequestId;
pub use ports::{BillingApi, Clock, NativeStore, ProfileStore, SubscriptionBackend, SystemClock};
pub use service::{BillingDependencies, BillingService, EntitlementReconciler, ProviderSelector};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            BillingError::NoProviderAvailable,
            BillingError::NotConnected,
            BillingError::ProductNotFound(String::new()),
            BillingError::ProductFetchFailed(String::new()),
            BillingError::PurchaseTimeout { secs: 30 },
            BillingError::PurchaseSuperseded(String::new()),
            BillingError::Disconnected,
            BillingError::UserCancelled,
            BillingError::provider("1", ""),
            BillingError::ReconciliationFailed(String::new()),
            BillingError::Config(String::new()),
        ];
        let codes: std::collections::HashSet<_> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), errors.len());
    }
}
