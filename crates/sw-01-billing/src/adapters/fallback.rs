//! Fallback Billing Adapter - native store with a listener callback.
//!
//! The store never returns a purchase outcome from `purchase_item`; it
//! reports it later on one process-wide listener. Each purchase registers
//! a pending entry keyed by product id and waits on it:
//!
//! ```text
//! Idle -> Initiated -> Resolved | Rejected | TimedOut
//! ```
//!
//! The listener finishes every unacknowledged transaction exactly once,
//! whether or not a caller is waiting for it.

use crate::adapters::pending::{cleanup_task, PendingTransactionRegistry, Settlement};
use crate::adapters::BillingAdapter;
use crate::domain::{
    BillingConfig, BillingError, BillingResult, ProviderKind, PurchaseRequest, PurchaseResult,
    TransactionEvent, TransactionOutcome,
};
use crate::ports::{NativeStore, PurchaseListener, PurchaseUpdate, StoreTransaction};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::slice;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use sw_telemetry::ORPHANED_TRANSACTIONS;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Billing over the native store.
pub struct FallbackBillingAdapter {
    store: Arc<dyn NativeStore>,
    registry: Arc<PendingTransactionRegistry>,
    purchase_timeout: Duration,
    sweep_interval: Duration,
    supporter_prefixes: Vec<String>,
    consume_on_finish: bool,
    connected: AtomicBool,
    listener_installed: AtomicBool,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl FallbackBillingAdapter {
    /// Create an adapter. Nothing touches the store until [`connect`](Self::connect).
    pub fn new(store: Arc<dyn NativeStore>, config: &BillingConfig) -> Self {
        Self {
            store,
            registry: Arc::new(PendingTransactionRegistry::new(config.purchase_timeout)),
            purchase_timeout: config.purchase_timeout,
            sweep_interval: config.sweep_interval,
            supporter_prefixes: config.supporter_product_prefixes.clone(),
            consume_on_finish: config.consume_on_finish,
            connected: AtomicBool::new(false),
            listener_installed: AtomicBool::new(false),
            sweeper: Mutex::new(None),
        }
    }

    /// Install the listener, open the store connection and start the
    /// stale-entry sweeper. Calling it again once connected is a no-op.
    ///
    /// The listener goes in first: the store may redeliver unfinished
    /// transactions as soon as it connects.
    pub async fn connect(&self) -> BillingResult<()> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }

        if !self.listener_installed.swap(true, Ordering::AcqRel) {
            self.store.set_purchase_listener(Arc::new(TransactionListener {
                store: Arc::downgrade(&self.store),
                registry: Arc::clone(&self.registry),
                consume: self.consume_on_finish,
            }));
            debug!("Purchase listener installed");
        }

        if let Err(e) = self.store.connect().await {
            self.store.remove_purchase_listener();
            self.listener_installed.store(false, Ordering::Release);
            warn!(code = e.code, error = %e, "Native store connection failed");
            return Err(e.into());
        }

        self.connected.store(true, Ordering::Release);

        let handle = tokio::spawn(cleanup_task(
            Arc::clone(&self.registry),
            self.sweep_interval,
        ));
        if let Some(previous) = self.sweeper.lock().replace(handle) {
            previous.abort();
        }

        info!(
            timeout_secs = self.purchase_timeout.as_secs(),
            "Native store connected"
        );
        Ok(())
    }

    /// Whether the store connection is open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Pending purchases awaiting the listener.
    pub fn registry(&self) -> &Arc<PendingTransactionRegistry> {
        &self.registry
    }

    fn ensure_connected(&self) -> BillingResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BillingError::NotConnected)
        }
    }

    async fn history_has_supporter(&self) -> BillingResult<bool> {
        self.ensure_connected()?;
        let history = self.store.get_purchase_history().await?;
        let supporter = history
            .iter()
            .any(|tx| tx.product_id.in_namespace(&self.supporter_prefixes));
        debug!(
            records = history.len(),
            supporter = supporter,
            "Checked purchase history"
        );
        Ok(supporter)
    }

    async fn await_settlement(
        &self,
        request: &PurchaseRequest,
        mut rx: oneshot::Receiver<Settlement>,
    ) -> BillingResult<TransactionEvent> {
        let secs = self.purchase_timeout.as_secs();

        match tokio::time::timeout(self.purchase_timeout, &mut rx).await {
            Ok(Ok(settlement)) => settlement,
            // Registry dropped the sender without settling.
            Ok(Err(_)) => Err(BillingError::Disconnected),
            Err(_) => {
                self.registry
                    .evict_timed_out(&request.product_id, request.request_id);
                // A settlement may have landed between the deadline and eviction.
                match rx.try_recv() {
                    Ok(settlement) => settlement,
                    Err(_) => {
                        warn!(
                            product_id = %request.product_id,
                            request_id = %request.request_id,
                            timeout_secs = secs,
                            "Purchase timed out waiting for the store"
                        );
                        Err(BillingError::PurchaseTimeout { secs })
                    }
                }
            }
        }
    }
}

#[async_trait]
impl BillingAdapter for FallbackBillingAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Fallback
    }

    async fn purchase(&self, request: &PurchaseRequest) -> BillingResult<PurchaseResult> {
        self.ensure_connected()?;
        let product_id = &request.product_id;

        let products = self
            .store
            .get_products(slice::from_ref(product_id))
            .await
            .map_err(|e| BillingError::ProductFetchFailed(e.to_string()))?;
        if !products.iter().any(|p| &p.product_id == product_id) {
            return Err(BillingError::ProductNotFound(product_id.to_string()));
        }

        let rx = self.registry.register(request, Some(self.purchase_timeout));

        // Only "the sheet was shown"; the outcome arrives on the listener.
        if let Err(e) = self.store.purchase_item(product_id).await {
            self.registry
                .remove_if_current(product_id, request.request_id);
            warn!(
                product_id = %product_id,
                request_id = %request.request_id,
                error = %e,
                "Failed to start purchase"
            );
            return Err(e.into());
        }

        debug!(
            product_id = %product_id,
            request_id = %request.request_id,
            "Purchase sheet shown, awaiting store listener"
        );

        let event = self.await_settlement(request, rx).await?;
        match event.outcome {
            TransactionOutcome::Success => {
                Ok(PurchaseResult::succeeded(ProviderKind::Fallback, true))
            }
            TransactionOutcome::UserCancelled => Err(BillingError::UserCancelled),
            TransactionOutcome::Error(code) => Err(BillingError::provider(
                code.to_string(),
                "store reported a purchase error",
            )),
        }
    }

    async fn restore(&self) -> BillingResult<PurchaseResult> {
        let supporter = self.history_has_supporter().await?;
        Ok(PurchaseResult::succeeded(ProviderKind::Fallback, supporter))
    }

    /// The store has no entitlement concept; any supporter-namespace
    /// product in the history counts.
    async fn has_entitlement(&self, _entitlement_id: &str) -> BillingResult<bool> {
        self.history_has_supporter().await
    }

    async fn shutdown(&self) -> BillingResult<()> {
        if self.listener_installed.swap(false, Ordering::AcqRel) {
            self.store.remove_purchase_listener();
        }

        let failed = self.registry.fail_all(BillingError::Disconnected);
        if failed > 0 {
            info!(failed = failed, "Pending purchases failed on disconnect");
        }

        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
        }

        if self.connected.swap(false, Ordering::AcqRel) {
            self.store.disconnect().await?;
            info!("Native store disconnected");
        }
        Ok(())
    }
}

impl Drop for FallbackBillingAdapter {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.abort();
        }
    }
}

/// The process-wide store listener.
///
/// Holds the store weakly: the store owns the listener.
struct TransactionListener {
    store: Weak<dyn NativeStore>,
    registry: Arc<PendingTransactionRegistry>,
    consume: bool,
}

impl TransactionListener {
    /// Finish a transaction unless the store already has. Returns whether it
    /// is acknowledged afterwards.
    async fn acknowledge(&self, tx: &StoreTransaction) -> bool {
        if tx.acknowledged {
            return true;
        }

        let Some(store) = self.store.upgrade() else {
            warn!(
                transaction_id = %tx.transaction_id,
                "Store released before transaction could be finished"
            );
            return false;
        };

        match store.finish_transaction(tx, self.consume).await {
            Ok(()) => {
                debug!(
                    product_id = %tx.product_id,
                    transaction_id = %tx.transaction_id,
                    consume = self.consume,
                    "Transaction finished"
                );
                true
            }
            Err(e) => {
                // The store redelivers unfinished transactions on reconnect.
                warn!(
                    product_id = %tx.product_id,
                    transaction_id = %tx.transaction_id,
                    error = %e,
                    "Failed to finish transaction"
                );
                false
            }
        }
    }

    async fn handle_transaction(&self, tx: StoreTransaction) {
        let acknowledged = self.acknowledge(&tx).await;

        let event = TransactionEvent {
            product_id: tx.product_id.clone(),
            transaction_id: Some(tx.transaction_id.clone()),
            acknowledged,
            outcome: TransactionOutcome::Success,
        };

        if self.registry.resolve(&tx.product_id, event) {
            info!(
                product_id = %tx.product_id,
                transaction_id = %tx.transaction_id,
                "Purchase completed"
            );
        } else {
            ORPHANED_TRANSACTIONS.inc();
            warn!(
                product_id = %tx.product_id,
                transaction_id = %tx.transaction_id,
                acknowledged = acknowledged,
                "Transaction with no waiting purchase"
            );
        }
    }
}

#[async_trait]
impl PurchaseListener for TransactionListener {
    async fn on_purchase_update(&self, update: PurchaseUpdate) {
        // Deferred: awaiting external approval, entries stay bounded by their timeout.
        let Some(outcome) = update.code.outcome() else {
            info!(
                transactions = update.results.len(),
                pending = self.registry.pending_count(),
                "Purchase deferred, awaiting approval"
            );
            return;
        };

        match outcome {
            TransactionOutcome::Success => {
                for tx in update.results {
                    self.handle_transaction(tx).await;
                }
            }
            TransactionOutcome::UserCancelled => {
                let rejected = self.registry.reject_all(outcome);
                info!(rejected = rejected, "Purchase cancelled by user");
            }
            TransactionOutcome::Error(code) => {
                let rejected = self.registry.reject_all(outcome);
                warn!(code = code, rejected = rejected, "Store reported a purchase error");
            }
        }
    }
}
