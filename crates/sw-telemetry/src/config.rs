//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name, logged once when logging starts and kept on the handle
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Whether to enable console output (for development)
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Build flavour (debug, release, store)
    pub environment: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "straywatch".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            environment: "debug".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SW_SERVICE_NAME`: Service name (default: straywatch)
    /// - `SW_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `SW_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `SW_JSON_LOGS`: Enable JSON logs (default: false)
    /// - `SW_ENVIRONMENT`: Build flavour (default: debug)
    pub fn from_env() -> Self {
        Self {
            service_name: env::var("SW_SERVICE_NAME").unwrap_or_else(|_| "straywatch".to_string()),

            log_level: env::var("SW_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("SW_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            json_logs: env::var("SW_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),

            environment: env::var("SW_ENVIRONMENT").unwrap_or_else(|_| "debug".to_string()),
        }
    }

    /// Create configuration for a named component.
    pub fn for_component(component: &str) -> Self {
        let mut config = Self::from_env();
        config.service_name = format!("straywatch-{}", component);
        config
    }
}
