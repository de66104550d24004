//! # Domain Module
//!
//! Core types, configuration and errors for the billing coordinator.
//! Async infrastructure (the pending registry) lives in the adapters layer.

pub mod config;
pub mod correlation;
pub mod error;
pub mod types;

pub use config::{BillingConfig, ConfigError, DEFAULT_PURCHASE_TIMEOUT};
pub use correlation::RequestId;
pub use error::{BillingError, BillingResult};
pub use types::*;
