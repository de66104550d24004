//! Error conversions from port error types.
//!
//! Port errors never reach callers as-is; they become [`BillingError`]
//! variants with stable codes.

use crate::domain::{BillingError, ConfigError};
use crate::ports::{BackendError, ProfileStoreError, StoreError};

impl From<StoreError> for BillingError {
    fn from(e: StoreError) -> Self {
        BillingError::provider(e.code.to_string(), e.message)
    }
}

impl From<BackendError> for BillingError {
    fn from(e: BackendError) -> Self {
        if e.user_cancelled {
            BillingError::UserCancelled
        } else {
            BillingError::provider(e.code, e.message)
        }
    }
}

impl From<ProfileStoreError> for BillingError {
    fn from(e: ProfileStoreError) -> Self {
        BillingError::ReconciliationFailed(e.to_string())
    }
}

impl From<ConfigError> for BillingError {
    fn from(e: ConfigError) -> Self {
        BillingError::Config(e.to_string())
    }
}
