//! Primary Billing Adapter - request/response subscription backend.
//!
//! Purchases resolve in a single call, so nothing is registered with the
//! pending registry.

use crate::adapters::BillingAdapter;
use crate::domain::{
    BillingError, BillingResult, ProviderKind, PurchaseRequest, PurchaseResult, UserId,
};
use crate::ports::SubscriptionBackend;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Billing over the subscription backend.
pub struct PrimaryBillingAdapter {
    backend: Arc<dyn SubscriptionBackend>,
    supporter_entitlement_id: String,
    logged_in: AtomicBool,
}

impl PrimaryBillingAdapter {
    /// Create an adapter checking `supporter_entitlement_id` on restore.
    pub fn new(backend: Arc<dyn SubscriptionBackend>, supporter_entitlement_id: &str) -> Self {
        Self {
            backend,
            supporter_entitlement_id: supporter_entitlement_id.to_string(),
            logged_in: AtomicBool::new(false),
        }
    }

    /// Configure the backend with its API key, then identify the user.
    pub async fn initialize(&self, api_key: &str, user_id: Option<&UserId>) -> BillingResult<()> {
        self.backend.configure(api_key).await?;
        debug!("Subscription backend configured");

        if let Some(user_id) = user_id {
            self.log_in(user_id).await?;
        }
        Ok(())
    }

    /// Identify the user with the backend.
    pub async fn log_in(&self, user_id: &UserId) -> BillingResult<()> {
        let info = self.backend.log_in(user_id).await?;
        self.logged_in.store(true, Ordering::Release);
        info!(
            user_id = %user_id,
            active_entitlements = info.active_entitlements.len(),
            "Logged in to subscription backend"
        );
        Ok(())
    }

    /// Forget the identified user. No-op when nobody is logged in.
    pub async fn log_out(&self) -> BillingResult<()> {
        if self.logged_in.swap(false, Ordering::AcqRel) {
            self.backend.log_out().await?;
            debug!("Logged out of subscription backend");
        }
        Ok(())
    }
}

#[async_trait]
impl BillingAdapter for PrimaryBillingAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Primary
    }

    async fn purchase(&self, request: &PurchaseRequest) -> BillingResult<PurchaseResult> {
        let offerings = self
            .backend
            .get_offerings()
            .await
            .map_err(|e| BillingError::ProductFetchFailed(e.to_string()))?;

        let package = offerings
            .current
            .as_ref()
            .and_then(|offering| offering.package_for(&request.product_id))
            .ok_or_else(|| BillingError::ProductNotFound(request.product_id.to_string()))?;

        debug!(
            product_id = %request.product_id,
            request_id = %request.request_id,
            package = %package.identifier,
            "Purchasing package"
        );

        let info = self.backend.purchase_package(package).await?;

        // Any active entitlement counts here, not just the supporter one.
        Ok(PurchaseResult::succeeded(
            ProviderKind::Primary,
            info.has_any_active(),
        ))
    }

    async fn restore(&self) -> BillingResult<PurchaseResult> {
        let info = self.backend.restore_purchases().await?;
        Ok(PurchaseResult::succeeded(
            ProviderKind::Primary,
            info.has_active(&self.supporter_entitlement_id),
        ))
    }

    async fn has_entitlement(&self, entitlement_id: &str) -> BillingResult<bool> {
        let info = self.backend.get_customer_info().await?;
        Ok(info.has_active(entitlement_id))
    }

    async fn shutdown(&self) -> BillingResult<()> {
        self.log_out().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockSubscriptionBackend;
    use crate::ports::BackendError;
    use chrono::Utc;

    fn adapter(backend: &Arc<MockSubscriptionBackend>) -> PrimaryBillingAdapter {
        PrimaryBillingAdapter::new(backend.clone(), "supporter")
    }

    fn request(product: &str) -> PurchaseRequest {
        PurchaseRequest::new(product.into(), None, Utc::now())
    }

    #[tokio::test]
    async fn test_initialize_configures_and_logs_in() {
        let backend = Arc::new(MockSubscriptionBackend::new());
        let adapter = adapter(&backend);

        adapter
            .initialize("appl_key", Some(&UserId::from("u1")))
            .await
            .unwrap();

        assert_eq!(backend.api_key().as_deref(), Some("appl_key"));
        assert_eq!(backend.logged_in_user(), Some(UserId::from("u1")));
    }

    #[tokio::test]
    async fn test_initialize_failure_propagates() {
        let backend = Arc::new(MockSubscriptionBackend::new());
        backend.fail_configure(true);

        let err = adapter(&backend).initialize("bad", None).await.unwrap_err();
        assert_eq!(err.code(), "PROVIDER_ERROR");
    }

    #[tokio::test]
    async fn test_purchase_grants_supporter() {
        let backend = Arc::new(MockSubscriptionBackend::with_products(
            &["supporter.monthly"],
            "supporter",
        ));
        let result = adapter(&backend)
            .purchase(&request("supporter.monthly"))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.is_supporter);
        assert_eq!(result.provider, ProviderKind::Primary);
        assert_eq!(backend.purchased(), vec!["$supporter.monthly".to_string()]);
    }

    #[tokio::test]
    async fn test_purchase_any_entitlement_counts() {
        let backend = Arc::new(MockSubscriptionBackend::with_products(
            &["pro.yearly"],
            "pro",
        ));
        let result = adapter(&backend)
            .purchase(&request("pro.yearly"))
            .await
            .unwrap();
        assert!(result.is_supporter);

        // Restore looks at the supporter entitlement only.
        let restored = adapter(&backend).restore().await.unwrap();
        assert!(!restored.is_supporter);
    }

    #[tokio::test]
    async fn test_purchase_unknown_package() {
        let backend = Arc::new(MockSubscriptionBackend::with_products(
            &["supporter.monthly"],
            "supporter",
        ));
        let err = adapter(&backend)
            .purchase(&request("supporter.lifetime"))
            .await
            .unwrap_err();
        assert_eq!(err, BillingError::ProductNotFound("supporter.lifetime".into()));
    }

    #[tokio::test]
    async fn test_offerings_failure() {
        let backend = Arc::new(MockSubscriptionBackend::with_products(
            &["supporter.monthly"],
            "supporter",
        ));
        backend.fail_offerings(true);
        let err = adapter(&backend)
            .purchase(&request("supporter.monthly"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PRODUCT_FETCH_FAILED");
    }

    #[tokio::test]
    async fn test_user_cancellation() {
        let backend = Arc::new(MockSubscriptionBackend::with_products(
            &["supporter.monthly"],
            "supporter",
        ));
        backend.fail_next_purchase(BackendError::cancelled());

        let err = adapter(&backend)
            .purchase(&request("supporter.monthly"))
            .await
            .unwrap_err();
        assert!(err.is_user_cancellation());
    }

    #[tokio::test]
    async fn test_has_entitlement_is_direct() {
        let backend = Arc::new(MockSubscriptionBackend::new());
        let adapter = adapter(&backend);
        assert!(!adapter.has_entitlement("supporter").await.unwrap());

        backend.grant("supporter");
        assert!(adapter.has_entitlement("supporter").await.unwrap());
        assert!(adapter.restore().await.unwrap().is_supporter);
    }

    #[tokio::test]
    async fn test_shutdown_logs_out_once() {
        let backend = Arc::new(MockSubscriptionBackend::new());
        let adapter = adapter(&backend);
        adapter
            .initialize("key", Some(&UserId::from("u1")))
            .await
            .unwrap();

        adapter.shutdown().await.unwrap();
        adapter.shutdown().await.unwrap();

        assert_eq!(backend.log_out_calls(), 1);
        assert_eq!(backend.logged_in_user(), None);
    }
}
