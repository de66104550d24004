//! Pending Transaction Registry - bridges the store listener to waiting callers.
//!
//! Maps product ids to fallback purchases awaiting a listener event.
//!
//! Flow:
//! 1. `purchase()` builds a [`PurchaseRequest`] and calls [`register`]
//! 2. The store's purchase sheet is shown; its return value is ignored
//! 3. The listener calls [`resolve`] / [`reject_all`] when the store reports
//! 4. `purchase()` awaits the receiver or times out and calls [`evict_timed_out`]
//!
//! The native listener only reports product ids, so there is one entry per
//! product. Registering the same product again replaces the older entry and
//! tells its caller with [`BillingError::PurchaseSuperseded`].
//!
//! [`register`]: PendingTransactionRegistry::register
//! [`resolve`]: PendingTransactionRegistry::resolve
//! [`reject_all`]: PendingTransactionRegistry::reject_all
//! [`evict_timed_out`]: PendingTransactionRegistry::evict_timed_out

use crate::domain::{
    BillingError, ProductId, PurchaseRequest, RequestId, TransactionEvent, TransactionOutcome,
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sw_telemetry::PENDING_PURCHASES;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// What a waiting caller receives.
pub type Settlement = Result<TransactionEvent, BillingError>;

/// A purchase waiting for the listener
struct PendingEntry {
    /// Request that owns this entry
    request_id: RequestId,
    /// Taken exactly once when the entry settles
    sender: Option<oneshot::Sender<Settlement>>,
    /// When the entry was registered
    created_at: Instant,
    /// Deadline relative to `created_at`
    timeout: Duration,
}

impl PendingEntry {
    fn settle(&mut self, settlement: Settlement) -> bool {
        match self.sender.take() {
            Some(sender) => sender.send(settlement).is_ok(),
            None => false,
        }
    }
}

/// Statistics for the registry
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total entries registered
    pub total_registered: AtomicU64,
    /// Entries resolved by a matching transaction
    pub total_completed: AtomicU64,
    /// Entries rejected by a cancel/error broadcast or teardown
    pub total_rejected: AtomicU64,
    /// Entries evicted by timeout
    pub total_timeouts: AtomicU64,
    /// Entries replaced by a newer request for the same product
    pub total_superseded: AtomicU64,
    /// Settlements whose caller had already gone away
    pub total_abandoned: AtomicU64,
}

/// Keyed table of outstanding fallback purchases.
pub struct PendingTransactionRegistry {
    /// Map of product id to pending entry
    pending: DashMap<ProductId, PendingEntry>,
    /// Default timeout
    default_timeout: Duration,
    /// Statistics
    stats: Arc<PendingStats>,
}

impl PendingTransactionRegistry {
    /// Create a new registry
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            default_timeout,
            stats: Arc::new(PendingStats::default()),
        }
    }

    /// Register a pending purchase and get a receiver for its settlement.
    pub fn register(
        &self,
        request: &PurchaseRequest,
        timeout: Option<Duration>,
    ) -> oneshot::Receiver<Settlement> {
        let (tx, rx) = oneshot::channel();

        let entry = PendingEntry {
            request_id: request.request_id,
            sender: Some(tx),
            created_at: Instant::now(),
            timeout: timeout.unwrap_or(self.default_timeout),
        };

        let replaced = self.pending.insert(request.product_id.clone(), entry);
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        if let Some(mut older) = replaced {
            self.stats.total_superseded.fetch_add(1, Ordering::Relaxed);
            warn!(
                product_id = %request.product_id,
                request_id = %request.request_id,
                superseded = %older.request_id,
                "Concurrent purchase of the same product, older request orphaned"
            );
            older.settle(Err(BillingError::PurchaseSuperseded(
                request.product_id.to_string(),
            )));
        }

        debug!(
            product_id = %request.product_id,
            request_id = %request.request_id,
            "Registered pending purchase"
        );
        self.publish_gauge();

        rx
    }

    /// Settle the entry for `product_id` with a matched transaction.
    ///
    /// Returns true if a waiting caller received it. Resolving a product with
    /// no entry is a no-op.
    pub fn resolve(&self, product_id: &ProductId, event: TransactionEvent) -> bool {
        let Some((_, mut entry)) = self.pending.remove(product_id) else {
            debug!(product_id = %product_id, "No pending entry to resolve");
            return false;
        };
        self.publish_gauge();

        let elapsed = entry.created_at.elapsed();
        if entry.settle(Ok(event)) {
            self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
            debug!(
                product_id = %product_id,
                request_id = %entry.request_id,
                elapsed_ms = elapsed.as_millis(),
                "Resolved pending purchase"
            );
            true
        } else {
            self.stats.total_abandoned.fetch_add(1, Ordering::Relaxed);
            debug!(
                product_id = %product_id,
                request_id = %entry.request_id,
                "Pending purchase receiver dropped"
            );
            false
        }
    }

    /// Reject every pending entry with a store outcome.
    ///
    /// The store does not say which purchase a cancel or error belongs to,
    /// so it applies to all of them. Returns the number of entries rejected.
    pub fn reject_all(&self, outcome: TransactionOutcome) -> usize {
        self.drain_with(|product_id| {
            Ok(TransactionEvent::broadcast(
                product_id.clone(),
                outcome.clone(),
            ))
        })
    }

    /// Fail every pending entry with a coordinator error (teardown).
    pub fn fail_all(&self, error: BillingError) -> usize {
        self.drain_with(|_| Err(error.clone()))
    }

    fn drain_with<F>(&self, settlement: F) -> usize
    where
        F: Fn(&ProductId) -> Settlement,
    {
        let products: Vec<ProductId> = self.pending.iter().map(|e| e.key().clone()).collect();
        let mut rejected = 0;

        for product_id in products {
            // Another path may have settled it since the snapshot.
            if let Some((_, mut entry)) = self.pending.remove(&product_id) {
                if !entry.settle(settlement(&product_id)) {
                    self.stats.total_abandoned.fetch_add(1, Ordering::Relaxed);
                }
                self.stats.total_rejected.fetch_add(1, Ordering::Relaxed);
                rejected += 1;
            }
        }

        if rejected > 0 {
            debug!(rejected = rejected, "Rejected pending purchases");
        }
        self.publish_gauge();
        rejected
    }

    /// Remove the entry for `product_id` only if it still belongs to
    /// `request_id`. A newer request's entry is left alone.
    pub fn remove_if_current(&self, product_id: &ProductId, request_id: RequestId) -> bool {
        let removed = self
            .pending
            .remove_if(product_id, |_, entry| entry.request_id == request_id)
            .is_some();
        if removed {
            self.publish_gauge();
        }
        removed
    }

    /// [`remove_if_current`](Self::remove_if_current) for a caller whose
    /// timeout elapsed.
    pub fn evict_timed_out(&self, product_id: &ProductId, request_id: RequestId) -> bool {
        let evicted = self.remove_if_current(product_id, request_id);
        if evicted {
            self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
        }
        evicted
    }

    /// Remove entries past their deadline (TTL cleanup).
    ///
    /// Callers still waiting receive [`BillingError::PurchaseTimeout`].
    /// Returns the number of entries removed.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.pending.retain(|product_id, entry| {
            let elapsed = now.duration_since(entry.created_at);
            if elapsed >= entry.timeout {
                warn!(
                    product_id = %product_id,
                    request_id = %entry.request_id,
                    elapsed_ms = elapsed.as_millis(),
                    timeout_ms = entry.timeout.as_millis(),
                    "Removing expired pending purchase"
                );
                entry.settle(Err(BillingError::PurchaseTimeout {
                    secs: entry.timeout.as_secs(),
                }));
                self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.publish_gauge();
        }
        removed
    }

    /// Number of pending entries
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check if a product has a pending entry
    pub fn is_pending(&self, product_id: &ProductId) -> bool {
        self.pending.contains_key(product_id)
    }

    /// Request currently owning the entry for `product_id`
    pub fn current_request(&self, product_id: &ProductId) -> Option<RequestId> {
        self.pending.get(product_id).map(|entry| entry.request_id)
    }

    /// Get statistics
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }

    fn publish_gauge(&self) {
        PENDING_PURCHASES.set(self.pending.len() as f64);
    }
}

/// Background task evicting entries whose caller stopped waiting.
pub async fn cleanup_task(registry: Arc<PendingTransactionRegistry>, interval: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        let removed = registry.remove_expired();
        if removed > 0 {
            debug!(removed = removed, "Cleaned up expired pending purchases");
        }
    }
}
