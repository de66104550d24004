//! # StrayWatch Telemetry
//!
//! Structured logging and Prometheus metrics shared by the StrayWatch
//! subsystems.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sw_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SW_SERVICE_NAME` | `straywatch` | Service name on every log line |
//! | `SW_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `SW_CONSOLE_OUTPUT` | `true` | Write log lines to stdout |
//! | `SW_JSON_LOGS` | `false` | Emit JSON instead of pretty output |
//! | `SW_ENVIRONMENT` | `debug` | Build flavour tag |

#![warn(missing_docs)]

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{build_filter, init_logging, LoggingHandle};
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, PurchaseTimer, ORPHANED_TRANSACTIONS,
    PENDING_PURCHASES, PURCHASES, PURCHASES_STARTED, PURCHASE_DURATION, RECONCILIATION_FAILURES,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The tracing subscriber could not be installed
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// A metric could not be registered or encoded
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Install logging and register metrics.
///
/// Hold the returned guard for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first so early log lines can reference them
    let metrics = register_metrics()?;
    let logging = init_logging(&config)?;

    Ok(TelemetryGuard {
        _logging: logging,
        metrics,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _logging: LoggingHandle,
    metrics: MetricsHandle,
}

impl TelemetryGuard {
    /// Metrics handle registered at startup.
    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry");
    }
}
