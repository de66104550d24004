//! Billing configuration with validation.
//!
//! Values come from the app shell's config file (serde) and can be
//! overridden from the environment with [`BillingConfig::from_env`].

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default window for a listener event to settle a fallback purchase.
pub const DEFAULT_PURCHASE_TIMEOUT: Duration = Duration::from_secs(30);

/// Main billing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Primary backend API key. Primary is only selected when this is set.
    pub primary_api_key: Option<String>,
    /// How long a fallback purchase waits for the store listener
    #[serde(with = "humantime_serde")]
    pub purchase_timeout: Duration,
    /// Interval of the stale pending-entry sweep
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// Product id prefixes that count as supporter/donation purchases on restore
    pub supporter_product_prefixes: Vec<String>,
    /// Entitlement id checked on the primary backend
    pub supporter_entitlement_id: String,
    /// Consume transactions when finishing them (donations are repeatable)
    pub consume_on_finish: bool,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            primary_api_key: None,
            purchase_timeout: DEFAULT_PURCHASE_TIMEOUT,
            sweep_interval: Duration::from_secs(5),
            supporter_product_prefixes: vec!["supporter.".to_string(), "donation.".to_string()],
            supporter_entitlement_id: "supporter".to_string(),
            consume_on_finish: true,
        }
    }
}

impl BillingConfig {
    /// Defaults overridden by environment variables.
    ///
    /// - `SW_PRIMARY_API_KEY`: primary backend key (unset = fallback only)
    /// - `SW_PURCHASE_TIMEOUT_SECS`: fallback purchase timeout (default: 30)
    /// - `SW_SUPPORTER_PREFIXES`: comma-separated product prefixes
    /// - `SW_SUPPORTER_ENTITLEMENT`: primary entitlement id (default: supporter)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            primary_api_key: env::var("SW_PRIMARY_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),

            purchase_timeout: env::var("SW_PURCHASE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.purchase_timeout),

            supporter_product_prefixes: env::var("SW_SUPPORTER_PREFIXES")
                .map(|v| parse_list(&v))
                .unwrap_or(defaults.supporter_product_prefixes),

            supporter_entitlement_id: env::var("SW_SUPPORTER_ENTITLEMENT")
                .unwrap_or(defaults.supporter_entitlement_id),

            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.purchase_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "purchase_timeout cannot be 0".into(),
            ));
        }

        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "sweep_interval cannot be 0".into(),
            ));
        }

        if self
            .supporter_product_prefixes
            .iter()
            .all(|p| p.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "at least one supporter product prefix is required".into(),
            ));
        }

        if self.supporter_entitlement_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "supporter_entitlement_id cannot be empty".into(),
            ));
        }

        Ok(())
    }

    /// Whether primary credentials are present.
    pub fn has_primary_credentials(&self) -> bool {
        self.primary_api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Configuration errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Humantime serde module for Duration serialization.
///
/// Precision is whole milliseconds; sub-millisecond remainders round up.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            let millis = duration.as_nanos().div_ceil(1_000_000);
            serializer.serialize_str(&format!("{millis}ms"))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map_err(|_| "invalid minutes")?
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or("minutes out of range")
        } else {
            // Plain seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
