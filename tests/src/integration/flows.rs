//! # Fallback Purchase Flows
//!
//! Purchases through the native store, where the outcome arrives on the
//! store listener at a time of the store's choosing:
//!
//! 1. **Matched success**: listener reports the product the caller waits on
//! 2. **Broadcast cancel/error**: every waiting caller is rejected
//! 3. **Orphans**: transactions nobody waits for are still finished once

#[cfg(test)]
mod tests {
    use crate::integration::TestApp;
    use std::sync::Arc;
    use sw_01_billing::ports::{PurchaseUpdate, ResponseCode, StoreTransaction};
    use sw_01_billing::{BillingApi, ProductId, ProviderKind, PurchaseResult, UserId};
    use sw_telemetry::ORPHANED_TRANSACTIONS;
    use tokio::task::JoinHandle;

    fn spawn_purchase(
        app: &TestApp,
        product: &str,
        user: Option<&str>,
    ) -> JoinHandle<PurchaseResult> {
        let service = Arc::clone(&app.service);
        let product = ProductId::from(product);
        let user = user.map(UserId::from);
        tokio::spawn(async move { service.purchase_product(&product, user.as_ref()).await })
    }

    // =============================================================================
    // MATCHED SUCCESS
    // =============================================================================

    #[tokio::test]
    async fn test_tier_gold_end_to_end() {
        let app = TestApp::fallback(&["tier.gold"]);
        assert_eq!(app.service.initialize(None).await, ProviderKind::Fallback);

        let purchase = spawn_purchase(&app, "tier.gold", None);
        app.store.wait_for_purchase_calls(1).await;

        app.store
            .emit(PurchaseUpdate::ok(vec![StoreTransaction::new(
                "tier.gold",
                "t1",
            )]))
            .await;

        let result = purchase.await.unwrap();
        assert_eq!(
            result,
            PurchaseResult::succeeded(ProviderKind::Fallback, true)
        );
        assert_eq!(app.store.finish_count("t1"), 1);
    }

    #[tokio::test]
    async fn test_first_purchase_initializes_lazily() {
        let app = TestApp::fallback(&["donation.small"]);
        assert_eq!(app.service.provider().await, ProviderKind::None);

        app.store
            .respond_to_next_purchase(PurchaseUpdate::ok(vec![StoreTransaction::new(
                "donation.small",
                "d1",
            )]));
        let result = app
            .service
            .purchase_product(&ProductId::from("donation.small"), None)
            .await;

        assert!(result.success);
        assert_eq!(app.service.provider().await, ProviderKind::Fallback);
    }

    #[tokio::test]
    async fn test_independent_products_resolve_independently() {
        let app = TestApp::fallback(&["donation.small", "donation.large"]);

        let small = spawn_purchase(&app, "donation.small", None);
        app.store.wait_for_purchase_calls(1).await;
        let large = spawn_purchase(&app, "donation.large", None);
        app.store.wait_for_purchase_calls(2).await;

        app.store
            .emit(PurchaseUpdate::ok(vec![StoreTransaction::new(
                "donation.large",
                "l1",
            )]))
            .await;
        assert!(large.await.unwrap().success);
        assert!(!small.is_finished());

        app.store
            .emit(PurchaseUpdate::ok(vec![StoreTransaction::new(
                "donation.small",
                "s1",
            )]))
            .await;
        assert!(small.await.unwrap().success);
    }

    #[tokio::test]
    async fn test_one_update_resolving_several_products() {
        let app = TestApp::fallback(&["donation.small", "donation.large"]);

        let small = spawn_purchase(&app, "donation.small", None);
        app.store.wait_for_purchase_calls(1).await;
        let large = spawn_purchase(&app, "donation.large", None);
        app.store.wait_for_purchase_calls(2).await;

        app.store
            .emit(PurchaseUpdate::ok(vec![
                StoreTransaction::new("donation.small", "s1"),
                StoreTransaction::new("donation.large", "l1"),
            ]))
            .await;

        assert!(small.await.unwrap().success);
        assert!(large.await.unwrap().success);
        assert_eq!(app.store.finish_count("s1"), 1);
        assert_eq!(app.store.finish_count("l1"), 1);
    }

    // =============================================================================
    // BROADCAST CANCEL / ERROR
    // =============================================================================

    #[tokio::test]
    async fn test_cancel_rejects_every_waiting_caller() {
        let products = ["donation.small", "donation.medium", "donation.large"];
        let app = TestApp::fallback(&products);

        let mut purchases = Vec::new();
        for (i, product) in products.iter().enumerate() {
            purchases.push(spawn_purchase(&app, product, Some("u1")));
            app.store.wait_for_purchase_calls(i + 1).await;
        }

        app.store.emit(PurchaseUpdate::cancelled()).await;

        for purchase in purchases {
            let result = purchase.await.unwrap();
            assert!(!result.success);
            assert_eq!(result.error.as_deref(), Some("USER_CANCELLED"));
        }
        assert!(app.profiles.updates().is_empty());
    }

    #[tokio::test]
    async fn test_store_error_rejects_with_provider_error() {
        let app = TestApp::fallback(&["tier.gold"]);

        let purchase = spawn_purchase(&app, "tier.gold", None);
        app.store.wait_for_purchase_calls(1).await;
        app.store.emit(PurchaseUpdate::error(2)).await;

        let result = purchase.await.unwrap();
        assert_eq!(result.error.as_deref(), Some("PROVIDER_ERROR"));
        assert_eq!(result.provider, ProviderKind::Fallback);
    }

    // =============================================================================
    // TIMEOUTS AND ORPHANS
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_late_success_is_orphan() {
        let app = TestApp::fallback(&["tier.gold"]);

        let result = spawn_purchase(&app, "tier.gold", Some("u1")).await.unwrap();
        assert_eq!(result.error.as_deref(), Some("PURCHASE_TIMEOUT"));

        let orphans = ORPHANED_TRANSACTIONS.get();
        app.store
            .emit(PurchaseUpdate::ok(vec![StoreTransaction::new(
                "tier.gold",
                "late",
            )]))
            .await;

        assert_eq!(app.store.finish_count("late"), 1);
        assert!(ORPHANED_TRANSACTIONS.get() >= orphans + 1.0);
        // Nobody was waiting, so no profile write either.
        assert!(app.profiles.updates().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_purchase_times_out() {
        let app = TestApp::fallback(&["tier.gold"]);
        app.store.respond_to_next_purchase(PurchaseUpdate {
            code: ResponseCode::Deferred,
            results: Vec::new(),
        });

        let result = app
            .service
            .purchase_product(&ProductId::from("tier.gold"), None)
            .await;
        assert_eq!(result.error.as_deref(), Some("PURCHASE_TIMEOUT"));
    }

    #[tokio::test]
    async fn test_leftover_transaction_finished_on_connect() {
        let app = TestApp::fallback(&[]);
        app.store.deliver_on_connect(PurchaseUpdate::ok(vec![
            StoreTransaction::new("supporter.monthly", "prev-1"),
            StoreTransaction::new("supporter.monthly", "prev-0").acknowledged(),
        ]));

        app.service.initialize(None).await;

        assert_eq!(app.store.finish_count("prev-1"), 1);
        assert_eq!(app.store.finish_count("prev-0"), 0);
    }

    #[tokio::test]
    async fn test_double_purchase_only_latest_caller_resolves() {
        let app = TestApp::fallback(&["tier.gold"]);

        let first = spawn_purchase(&app, "tier.gold", None);
        app.store.wait_for_purchase_calls(1).await;
        let second = spawn_purchase(&app, "tier.gold", None);
        app.store.wait_for_purchase_calls(2).await;

        assert_eq!(
            first.await.unwrap().error.as_deref(),
            Some("PURCHASE_SUPERSEDED")
        );

        app.store
            .emit(PurchaseUpdate::ok(vec![StoreTransaction::new(
                "tier.gold",
                "t1",
            )]))
            .await;
        assert!(second.await.unwrap().success);
        assert_eq!(app.store.finish_count("t1"), 1);
    }

    #[tokio::test]
    async fn test_disconnect_fails_waiting_callers() {
        let app = TestApp::fallback(&["tier.gold"]);

        let purchase = spawn_purchase(&app, "tier.gold", None);
        app.store.wait_for_purchase_calls(1).await;
        app.service.disconnect().await;

        let result = purchase.await.unwrap();
        assert_eq!(result.error.as_deref(), Some("DISCONNECTED"));
        assert!(!app.store.listener_installed());
    }
}
