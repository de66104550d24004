//! # Provider Selection and Profile Reconciliation
//!
//! Which backend serves purchases, what happens when switching, and how
//! supporter status reaches the profile table.

#[cfg(test)]
mod tests {
    use crate::integration::TestApp;
    use chrono::Duration;
    use sw_01_billing::ports::{Clock, StoreTransaction};
    use sw_01_billing::{BillingApi, BillingConfig, ProductId, ProviderKind, UserId};

    #[tokio::test]
    async fn test_primary_selected_with_credentials() {
        let app = TestApp::primary(&["supporter.monthly"]);
        let user = UserId::from("u1");

        assert_eq!(app.service.initialize(Some(&user)).await, ProviderKind::Primary);
        assert_eq!(app.backend.api_key().as_deref(), Some("appl_test_key"));
        assert_eq!(app.backend.logged_in_user(), Some(user));
        assert_eq!(app.store.connect_calls(), 0);
    }

    #[tokio::test]
    async fn test_primary_purchase_marks_profile_supporter() {
        let app = TestApp::primary(&["supporter.monthly"]);
        let user = UserId::from("u1");
        let bought_at = app.clock.now();

        let result = app
            .service
            .purchase_product(&ProductId::from("supporter.monthly"), Some(&user))
            .await;
        assert!(result.success && result.is_supporter);

        let row = app.profiles.get(&user).unwrap();
        assert_eq!(row.is_supporter, Some(true));
        assert_eq!(row.supporter_since, Some(bought_at));
    }

    #[tokio::test]
    async fn test_repeat_purchase_keeps_supporter_since() {
        let app = TestApp::primary(&["supporter.monthly"]);
        let user = UserId::from("u1");
        let first = app.clock.now();

        app.service
            .purchase_product(&ProductId::from("supporter.monthly"), Some(&user))
            .await;
        app.clock.advance(Duration::days(31));
        app.service
            .purchase_product(&ProductId::from("supporter.monthly"), Some(&user))
            .await;

        let row = app.profiles.get(&user).unwrap();
        assert_eq!(row.supporter_since, Some(first));
        assert_eq!(row.updated_at, Some(app.clock.now()));
        assert_eq!(app.profiles.updates().len(), 2);
    }

    #[tokio::test]
    async fn test_primary_init_failure_retried() {
        let app = TestApp::primary(&["supporter.monthly"]);
        app.backend.fail_configure(true);

        let result = app
            .service
            .purchase_product(&ProductId::from("supporter.monthly"), None)
            .await;
        assert_eq!(result.error.as_deref(), Some("NO_PROVIDER"));

        app.backend.fail_configure(false);
        assert_eq!(app.service.initialize(None).await, ProviderKind::Primary);
    }

    #[tokio::test]
    async fn test_restore_through_fallback_history() {
        let app = TestApp::fallback(&[]);
        let user = UserId::from("u2");

        let result = app.service.restore_purchases(Some(&user)).await;
        assert!(result.success);
        assert!(!result.is_supporter);
        assert!(app.profiles.updates().is_empty());

        app.store
            .add_history(StoreTransaction::new("donation.large", "h1").acknowledged());
        let result = app.service.restore_purchases(Some(&user)).await;
        assert!(result.is_supporter);
        assert_eq!(app.profiles.get(&user).unwrap().is_supporter, Some(true));
    }

    #[tokio::test]
    async fn test_custom_supporter_namespace() {
        let config = BillingConfig {
            supporter_product_prefixes: vec!["tier.".to_string()],
            ..BillingConfig::default()
        };
        let app = TestApp::new(config, &[], &[]);
        app.store
            .add_history(StoreTransaction::new("donation.large", "h1").acknowledged());
        assert!(!app.service.has_supporter(None).await);

        app.store
            .add_history(StoreTransaction::new("tier.gold", "h2").acknowledged());
        assert!(app.service.has_supporter(None).await);
    }

    #[tokio::test]
    async fn test_switching_provider_requires_disconnect() {
        let app = TestApp::fallback(&["tier.gold"]);
        assert_eq!(app.service.initialize(None).await, ProviderKind::Fallback);
        assert_eq!(app.service.initialize(None).await, ProviderKind::Fallback);
        assert_eq!(app.store.connect_calls(), 1);

        app.service.disconnect().await;
        assert_eq!(app.service.provider().await, ProviderKind::None);
        assert!(!app.store.is_connected());

        assert_eq!(app.service.initialize(None).await, ProviderKind::Fallback);
        assert_eq!(app.store.connect_calls(), 2);
    }

    #[tokio::test]
    async fn test_primary_logout_on_disconnect() {
        let app = TestApp::primary(&["supporter.monthly"]);
        app.service.initialize(Some(&UserId::from("u3"))).await;

        app.service.disconnect().await;
        assert_eq!(app.backend.log_out_calls(), 1);
        assert_eq!(app.backend.logged_in_user(), None);
    }
}
