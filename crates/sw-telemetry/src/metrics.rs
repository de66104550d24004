//! Prometheus metrics for the billing subsystem.
//!
//! All metrics follow the naming convention: `sw_billing_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: purchases started, outcomes, orphaned transactions
//! - **Gauge**: purchases currently awaiting a store callback
//! - **Histogram**: time from purchase start to settlement

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // PURCHASE METRICS
    // =========================================================================

    /// Purchases started, by provider
    pub static ref PURCHASES_STARTED: CounterVec = CounterVec::new(
        Opts::new("sw_billing_purchases_started_total", "Purchases started by provider"),
        &["provider"]  // provider: primary/fallback/none
    ).expect("metric creation failed");

    /// Purchases finished, by provider and outcome
    pub static ref PURCHASES: CounterVec = CounterVec::new(
        Opts::new("sw_billing_purchases_total", "Purchases finished by provider and outcome"),
        &["provider", "outcome"]  // outcome: success or an error code
    ).expect("metric creation failed");

    /// Purchase duration histogram
    pub static ref PURCHASE_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "sw_billing_purchase_duration_seconds",
            "Time from purchase start to settlement"
        ).buckets(exponential_buckets(0.05, 2.0, 12).unwrap_or_default()),
        &["provider"]
    ).expect("metric creation failed");

    // =========================================================================
    // NATIVE STORE METRICS
    // =========================================================================

    /// Purchases awaiting a store callback
    pub static ref PENDING_PURCHASES: Gauge = Gauge::new(
        "sw_billing_pending_purchases",
        "Number of purchases awaiting a store callback"
    ).expect("metric creation failed");

    /// Transactions delivered with no waiting caller
    pub static ref ORPHANED_TRANSACTIONS: Counter = Counter::new(
        "sw_billing_orphaned_transactions_total",
        "Successful store transactions that arrived with no waiting purchase"
    ).expect("metric creation failed");

    // =========================================================================
    // PROFILE METRICS
    // =========================================================================

    /// Failed profile reconciliations
    pub static ref RECONCILIATION_FAILURES: Counter = Counter::new(
        "sw_billing_reconciliation_failures_total",
        "Supporter status writes to the profile store that failed"
    ).expect("metric creation failed");
}

/// Handle to the registry the metrics live in
pub struct MetricsHandle {
    registry: Arc<Registry>,
}

impl MetricsHandle {
    /// Registry the billing metrics were registered with.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Register all metrics with the global registry.
///
/// Calling this more than once is harmless.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Purchases
        Box::new(PURCHASES_STARTED.clone()),
        Box::new(PURCHASES.clone()),
        Box::new(PURCHASE_DURATION.clone()),
        // Native store
        Box::new(PENDING_PURCHASES.clone()),
        Box::new(ORPHANED_TRANSACTIONS.clone()),
        // Profile
        Box::new(RECONCILIATION_FAILURES.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard that records a purchase duration on drop.
pub struct PurchaseTimer {
    provider: &'static str,
    start: Instant,
}

impl PurchaseTimer {
    /// Start timing a purchase for the given provider label.
    pub fn start(provider: &'static str) -> Self {
        PURCHASES_STARTED.with_label_values(&[provider]).inc();
        Self {
            provider,
            start: Instant::now(),
        }
    }

    /// Record the outcome label alongside the duration.
    pub fn finish(self, outcome: &str) {
        PURCHASES.with_label_values(&[self.provider, outcome]).inc();
    }
}

impl Drop for PurchaseTimer {
    fn drop(&mut self) {
        PURCHASE_DURATION
            .with_label_values(&[self.provider])
            .observe(self.start.elapsed().as_secs_f64());
    }
}
