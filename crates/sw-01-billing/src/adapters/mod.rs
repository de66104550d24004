//! # Adapters Layer
//!
//! Billing adapters over the outbound ports, the pending registry that
//! correlates listener callbacks with waiting callers, and in-memory port
//! implementations for tests and demos.

pub mod error_conversions;
pub mod fallback;
pub mod mock;
pub mod pending;
pub mod primary;

pub use fallback::FallbackBillingAdapter;
pub use pending::{cleanup_task, PendingStats, PendingTransactionRegistry, Settlement};
pub use primary::PrimaryBillingAdapter;

use crate::domain::{BillingResult, ProviderKind, PurchaseRequest, PurchaseResult};
use async_trait::async_trait;

/// A selected billing backend, as seen by the coordinator.
///
/// Both adapters answer purchases with a [`PurchaseResult`] on success and
/// a typed error otherwise; the coordinator flattens errors into results.
#[async_trait]
pub trait BillingAdapter: Send + Sync {
    /// Which provider this is.
    fn kind(&self) -> ProviderKind;

    /// Buy the requested product.
    async fn purchase(&self, request: &PurchaseRequest) -> BillingResult<PurchaseResult>;

    /// Restore previous purchases.
    async fn restore(&self) -> BillingResult<PurchaseResult>;

    /// Whether the named entitlement is currently held.
    async fn has_entitlement(&self, entitlement_id: &str) -> BillingResult<bool>;

    /// Release the backend connection.
    async fn shutdown(&self) -> BillingResult<()>;
}
