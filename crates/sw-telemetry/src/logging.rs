//! Structured logging setup.
//!
//! Pretty output for development, JSON for log shipping. The filter comes
//! from `RUST_LOG` when set, otherwise from [`TelemetryConfig::log_level`].

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Handle returned once logging is installed
#[derive(Debug)]
pub struct LoggingHandle {
    service_name: String,
}

impl LoggingHandle {
    /// Service name the subscriber was installed for.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

/// Build the filter from the environment or the configured level.
pub fn build_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Install the global tracing subscriber.
///
/// Fails instead of panicking when a subscriber is already installed.
pub fn init_logging(config: &TelemetryConfig) -> Result<LoggingHandle, TelemetryError> {
    let env_filter = build_filter(config)?;

    if !config.console_output {
        tracing_subscriber::registry()
            .with(env_filter)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else if config.json_logs {
        // JSON output for log shipping
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else {
        // Pretty output for development
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    }

    tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        json_logs = config.json_logs,
        "Logging initialized"
    );

    Ok(LoggingHandle {
        service_name: config.service_name.clone(),
    })
}
