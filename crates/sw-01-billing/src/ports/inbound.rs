//! # Inbound Ports
//!
//! What the app shell can ask of the billing coordinator.

use crate::domain::{ProductId, ProviderKind, PurchaseResult, UserId};
use async_trait::async_trait;

/// Billing API - inbound port.
///
/// None of these calls return provider errors: purchase paths converge on a
/// [`PurchaseResult`] and queries degrade to a safe default.
#[async_trait]
pub trait BillingApi: Send + Sync {
    /// Select and initialize a provider. No-op when already initialized.
    async fn initialize(&self, user_id: Option<&UserId>) -> ProviderKind;

    /// Buy a product.
    async fn purchase_product(
        &self,
        product_id: &ProductId,
        user_id: Option<&UserId>,
    ) -> PurchaseResult;

    /// Restore previous purchases.
    async fn restore_purchases(&self, user_id: Option<&UserId>) -> PurchaseResult;

    /// Whether the user currently holds supporter status.
    async fn has_supporter(&self, user_id: Option<&UserId>) -> bool;

    /// Active provider, `None` before initialization.
    async fn provider(&self) -> ProviderKind;

    /// Tear down the active provider. The next call re-initializes.
    async fn disconnect(&self);
}
