//! # Service Layer
//!
//! Provider selection, entitlement reconciliation and the coordinator that
//! implements [`BillingApi`](crate::ports::BillingApi).

pub mod coordinator;
pub mod reconciler;
pub mod selector;

pub use coordinator::{BillingDependencies, BillingService};
pub use reconciler::EntitlementReconciler;
pub use selector::ProviderSelector;
