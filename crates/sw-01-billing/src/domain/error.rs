//! # Domain Errors
//!
//! Error taxonomy for the billing coordinator. Every variant has a stable
//! code that is what callers see in [`PurchaseResult::error`].
//!
//! [`PurchaseResult::error`]: crate::domain::PurchaseResult

use thiserror::Error;

/// Billing error types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BillingError {
    /// No billing backend could be selected.
    #[error("No billing provider available")]
    NoProviderAvailable,

    /// Native store used before `connect()` completed.
    #[error("Billing store not connected")]
    NotConnected,

    /// Product id unknown to the backend.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Product metadata could not be fetched.
    #[error("Failed to fetch products: {0}")]
    ProductFetchFailed(String),

    /// No listener event settled the purchase in time.
    #[error("Purchase timeout - no response after {secs}s")]
    PurchaseTimeout {
        /// Timeout that elapsed
        secs: u64,
    },

    /// A newer purchase of the same product replaced this one.
    #[error("Purchase superseded by a newer request for {0}")]
    PurchaseSuperseded(String),

    /// The adapter was torn down while the purchase was pending.
    #[error("Billing provider disconnected")]
    Disconnected,

    /// The user dismissed the purchase. Not a failure for presentation.
    #[error("User cancelled")]
    UserCancelled,

    /// Backend reported an error.
    #[error("Provider error {code}: {message}")]
    ProviderError {
        /// Backend error code
        code: String,
        /// Backend message
        message: String,
    },

    /// Profile update failed. Logged, never propagated to purchase results.
    #[error("Entitlement reconciliation failed: {0}")]
    ReconciliationFailed(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BillingError {
    /// Build a provider error.
    pub fn provider(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderError {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Stable code surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::NoProviderAvailable => "NO_PROVIDER",
            BillingError::NotConnected => "NOT_CONNECTED",
            BillingError::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            BillingError::ProductFetchFailed(_) => "PRODUCT_FETCH_FAILED",
            BillingError::PurchaseTimeout { .. } => "PURCHASE_TIMEOUT",
            BillingError::PurchaseSuperseded(_) => "PURCHASE_SUPERSEDED",
            BillingError::Disconnected => "DISCONNECTED",
            BillingError::UserCancelled => "USER_CANCELLED",
            BillingError::ProviderError { .. } => "PROVIDER_ERROR",
            BillingError::ReconciliationFailed(_) => "RECONCILIATION_FAILED",
            BillingError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether this is the dismissible cancellation outcome.
    pub fn is_user_cancellation(&self) -> bool {
        matches!(self, BillingError::UserCancelled)
    }
}

/// Result alias for billing operations.
pub type BillingResult<T> = Result<T, BillingError>;
