//! Provider Selector - picks exactly one billing adapter per process.
//!
//! Precedence: primary backend when credentials are configured and the
//! backend is wired in, otherwise the native store, otherwise none.

use crate::adapters::{BillingAdapter, FallbackBillingAdapter, PrimaryBillingAdapter};
use crate::domain::{BillingConfig, BillingResult, ProviderKind, UserId};
use crate::ports::{NativeStore, SubscriptionBackend};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

enum SelectorState {
    Uninitialized,
    Ready(Option<Arc<dyn BillingAdapter>>),
}

/// Chooses and owns the active adapter.
pub struct ProviderSelector {
    config: BillingConfig,
    primary: Option<Arc<dyn SubscriptionBackend>>,
    native: Option<Arc<dyn NativeStore>>,
    // Held across initialization so concurrent callers initialize once.
    state: Mutex<SelectorState>,
}

impl ProviderSelector {
    /// Create an uninitialized selector over whichever backends exist.
    pub fn new(
        config: BillingConfig,
        primary: Option<Arc<dyn SubscriptionBackend>>,
        native: Option<Arc<dyn NativeStore>>,
    ) -> Self {
        Self {
            config,
            primary,
            native,
            state: Mutex::new(SelectorState::Uninitialized),
        }
    }

    /// Initialize if needed and report the selected provider.
    pub async fn ensure_initialized(&self, user_id: Option<&UserId>) -> ProviderKind {
        self.active_adapter(user_id)
            .await
            .map(|adapter| adapter.kind())
            .unwrap_or_default()
    }

    /// The active adapter, initializing on first use.
    ///
    /// A failed initialization yields `None` for this call and leaves the
    /// selector uninitialized so the next call retries.
    pub async fn active_adapter(
        &self,
        user_id: Option<&UserId>,
    ) -> Option<Arc<dyn BillingAdapter>> {
        let mut state = self.state.lock().await;
        if let SelectorState::Ready(adapter) = &*state {
            return adapter.clone();
        }

        match self.initialize(user_id).await {
            Ok(adapter) => {
                let kind = adapter.as_ref().map(|a| a.kind()).unwrap_or_default();
                info!(provider = kind.as_str(), "Billing provider selected");
                *state = SelectorState::Ready(adapter.clone());
                adapter
            }
            Err(e) => {
                warn!(
                    code = e.code(),
                    error = %e,
                    "Billing initialization failed, no provider for this attempt"
                );
                None
            }
        }
    }

    /// Provider currently selected, without initializing.
    pub async fn current(&self) -> ProviderKind {
        match &*self.state.lock().await {
            SelectorState::Ready(Some(adapter)) => adapter.kind(),
            _ => ProviderKind::None,
        }
    }

    /// Whether a selection (including none) has been made.
    pub async fn is_initialized(&self) -> bool {
        matches!(&*self.state.lock().await, SelectorState::Ready(_))
    }

    /// Tear down the active adapter and return to uninitialized.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, SelectorState::Uninitialized);

        if let SelectorState::Ready(Some(adapter)) = previous {
            let kind = adapter.kind();
            match adapter.shutdown().await {
                Ok(()) => info!(provider = kind.as_str(), "Billing provider disconnected"),
                Err(e) => warn!(
                    provider = kind.as_str(),
                    error = %e,
                    "Billing provider shutdown failed"
                ),
            }
        }
    }

    async fn initialize(
        &self,
        user_id: Option<&UserId>,
    ) -> BillingResult<Option<Arc<dyn BillingAdapter>>> {
        if let (Some(api_key), Some(backend)) =
            (self.config.primary_api_key.as_deref(), &self.primary)
        {
            if self.config.has_primary_credentials() {
                let adapter = PrimaryBillingAdapter::new(
                    Arc::clone(backend),
                    &self.config.supporter_entitlement_id,
                );
                adapter.initialize(api_key, user_id).await?;
                return Ok(Some(Arc::new(adapter)));
            }
        }

        if let Some(store) = &self.native {
            let adapter = FallbackBillingAdapter::new(Arc::clone(store), &self.config);
            adapter.connect().await?;
            return Ok(Some(Arc::new(adapter)));
        }

        Ok(None)
    }
}
