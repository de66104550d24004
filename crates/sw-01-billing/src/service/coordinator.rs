//! Billing Service - the coordinator behind [`BillingApi`].
//!
//! Every purchase path ends in a [`PurchaseResult`]; adapter errors are
//! converted here and never reach the caller raw. Successful supporter
//! purchases and restores are mirrored to the profile store when the user
//! is known.

use crate::adapters::BillingAdapter;
use crate::domain::{
    BillingConfig, BillingError, BillingResult, ProductId, ProviderKind, PurchaseRequest,
    PurchaseResult, UserId,
};
use crate::ports::{BillingApi, Clock, NativeStore, ProfileStore, SubscriptionBackend};
use crate::service::{EntitlementReconciler, ProviderSelector};
use async_trait::async_trait;
use std::sync::Arc;
use sw_telemetry::{PurchaseTimer, RECONCILIATION_FAILURES};
use tracing::{info, warn};

/// Dependencies for [`BillingService`]
pub struct BillingDependencies {
    /// Subscription backend, when the SDK is available on this platform
    pub primary: Option<Arc<dyn SubscriptionBackend>>,
    /// Native store, when available on this platform
    pub native: Option<Arc<dyn NativeStore>>,
    /// Remote profile table
    pub profiles: Arc<dyn ProfileStore>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

/// Purchase coordinator. Construct once and share by `Arc`.
pub struct BillingService {
    selector: ProviderSelector,
    reconciler: EntitlementReconciler,
    clock: Arc<dyn Clock>,
    supporter_entitlement_id: String,
}

impl BillingService {
    /// Validate the configuration and build the service. No backend is
    /// touched until the first call.
    pub fn new(config: BillingConfig, deps: BillingDependencies) -> BillingResult<Self> {
        config.validate()?;

        Ok(Self {
            supporter_entitlement_id: config.supporter_entitlement_id.clone(),
            reconciler: EntitlementReconciler::new(deps.profiles, Arc::clone(&deps.clock)),
            selector: ProviderSelector::new(config, deps.primary, deps.native),
            clock: deps.clock,
        })
    }

    fn failure(
        &self,
        provider: ProviderKind,
        product_id: Option<&ProductId>,
        error: BillingError,
    ) -> PurchaseResult {
        let product = product_id.map(|p| p.as_str()).unwrap_or("-");
        if error.is_user_cancellation() {
            info!(provider = provider.as_str(), product_id = product, "Purchase cancelled by user");
        } else {
            warn!(
                provider = provider.as_str(),
                product_id = product,
                code = error.code(),
                error = %error,
                "Billing call failed"
            );
        }
        PurchaseResult::failed(provider, &error)
    }

    /// Mirror supporter status to the profile. Failures are logged only.
    async fn reconcile(&self, result: &PurchaseResult, user_id: Option<&UserId>) {
        if !(result.success && result.is_supporter) {
            return;
        }
        let Some(user_id) = user_id else {
            return;
        };

        if let Err(e) = self.reconciler.reconcile(user_id, true).await {
            RECONCILIATION_FAILURES.inc();
            warn!(
                user_id = %user_id,
                code = e.code(),
                error = %e,
                "Supporter status not saved to profile"
            );
        }
    }
}

#[async_trait]
impl BillingApi for BillingService {
    async fn initialize(&self, user_id: Option<&UserId>) -> ProviderKind {
        self.selector.ensure_initialized(user_id).await
    }

    async fn purchase_product(
        &self,
        product_id: &ProductId,
        user_id: Option<&UserId>,
    ) -> PurchaseResult {
        let Some(adapter) = self.selector.active_adapter(user_id).await else {
            return self.failure(
                ProviderKind::None,
                Some(product_id),
                BillingError::NoProviderAvailable,
            );
        };
        let provider = adapter.kind();

        let request = PurchaseRequest::new(product_id.clone(), user_id.cloned(), self.clock.now());
        info!(
            provider = provider.as_str(),
            product_id = %product_id,
            request_id = %request.request_id,
            "Purchase started"
        );

        let timer = PurchaseTimer::start(provider.as_str());
        let result = match adapter.purchase(&request).await {
            Ok(result) => {
                info!(
                    provider = provider.as_str(),
                    product_id = %product_id,
                    request_id = %request.request_id,
                    is_supporter = result.is_supporter,
                    "Purchase succeeded"
                );
                result
            }
            Err(e) => self.failure(provider, Some(product_id), e),
        };
        timer.finish(result.error.as_deref().unwrap_or("success"));

        self.reconcile(&result, user_id).await;
        result
    }

    async fn restore_purchases(&self, user_id: Option<&UserId>) -> PurchaseResult {
        let Some(adapter) = self.selector.active_adapter(user_id).await else {
            return self.failure(ProviderKind::None, None, BillingError::NoProviderAvailable);
        };
        let provider = adapter.kind();

        let result = match adapter.restore().await {
            Ok(result) => {
                info!(
                    provider = provider.as_str(),
                    is_supporter = result.is_supporter,
                    "Purchases restored"
                );
                result
            }
            Err(e) => self.failure(provider, None, e),
        };

        self.reconcile(&result, user_id).await;
        result
    }

    async fn has_supporter(&self, user_id: Option<&UserId>) -> bool {
        let Some(adapter) = self.selector.active_adapter(user_id).await else {
            return false;
        };

        match adapter.has_entitlement(&self.supporter_entitlement_id).await {
            Ok(held) => held,
            Err(e) => {
                warn!(
                    provider = adapter.kind().as_str(),
                    code = e.code(),
                    error = %e,
                    "Entitlement check failed"
                );
                false
            }
        }
    }

    async fn provider(&self) -> ProviderKind {
        self.selector.current().await
    }

    async fn disconnect(&self) {
        self.selector.reset().await;
    }
}
