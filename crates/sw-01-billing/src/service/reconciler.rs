//! Entitlement Reconciler - mirrors supporter status onto the profile row.

use crate::domain::{BillingResult, EntitlementUpdate, UserId};
use crate::ports::{Clock, ProfileStore};
use std::sync::Arc;
use tracing::{debug, info};

/// Writes supporter status to the remote profile store.
pub struct EntitlementReconciler {
    profiles: Arc<dyn ProfileStore>,
    clock: Arc<dyn Clock>,
}

impl EntitlementReconciler {
    /// Create a reconciler.
    pub fn new(profiles: Arc<dyn ProfileStore>, clock: Arc<dyn Clock>) -> Self {
        Self { profiles, clock }
    }

    /// Update the user's supporter flag.
    ///
    /// `supporter_since` is only written on the first transition to
    /// supporter and never replaced once set. `updated_at` is always
    /// refreshed. Returns the update that was applied.
    pub async fn reconcile(
        &self,
        user_id: &UserId,
        is_supporter: bool,
    ) -> BillingResult<EntitlementUpdate> {
        let existing = self
            .profiles
            .fetch_profile(user_id)
            .await?
            .unwrap_or_default();
        let was_supporter = existing.is_supporter.unwrap_or(false);
        let now = self.clock.now();

        let first_transition =
            is_supporter && !was_supporter && existing.supporter_since.is_none();

        let update = EntitlementUpdate {
            user_id: user_id.clone(),
            is_supporter,
            supporter_since: first_transition.then_some(now),
            updated_at: now,
        };
        self.profiles.update_supporter(&update).await?;

        if first_transition {
            info!(user_id = %user_id, "User became a supporter");
        } else {
            debug!(
                user_id = %user_id,
                is_supporter = is_supporter,
                "Supporter status refreshed"
            );
        }
        Ok(update)
    }
}
