//! Core value types for the billing coordinator.
//!
//! Every purchase path, synchronous or listener-driven, converges on a
//! [`PurchaseResult`].

use crate::domain::correlation::RequestId;
use crate::domain::error::BillingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Store product identifier (e.g. `supporter.monthly`).
    ProductId
);

string_id!(
    /// Application user identifier, also the profile row id.
    UserId
);

string_id!(
    /// Store-assigned transaction identifier.
    TransactionId
);

impl ProductId {
    /// Whether this product falls under any of the given namespace prefixes.
    pub fn in_namespace<S: AsRef<str>>(&self, prefixes: &[S]) -> bool {
        prefixes
            .iter()
            .any(|prefix| self.0.starts_with(prefix.as_ref()))
    }
}

/// Which billing backend serves purchases for this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Subscription-service backend (request/response).
    Primary,
    /// Native store backend (listener-driven).
    Fallback,
    /// No usable backend.
    #[default]
    None,
}

impl ProviderKind {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Primary => "primary",
            ProviderKind::Fallback => "fallback",
            ProviderKind::None => "none",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Primary => write!(f, "Primary"),
            ProviderKind::Fallback => write!(f, "Fallback"),
            ProviderKind::None => write!(f, "None"),
        }
    }
}

/// A caller's request to buy one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseRequest {
    /// Generated per call; correlates logs and guards timeout eviction.
    pub request_id: RequestId,
    /// Product being bought. This is the registry key.
    pub product_id: ProductId,
    /// When the caller asked.
    pub requested_at: DateTime<Utc>,
    /// Buyer, when known.
    pub user_id: Option<UserId>,
}

impl PurchaseRequest {
    /// Create a request stamped with a fresh [`RequestId`].
    pub fn new(
        product_id: ProductId,
        user_id: Option<UserId>,
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id: RequestId::new(),
            product_id,
            requested_at,
            user_id,
        }
    }
}

/// Outcome reported by the native store for a purchase attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// Payment went through.
    Success,
    /// The user dismissed the purchase sheet.
    UserCancelled,
    /// Store-side failure with its error code.
    Error(i32),
}

/// A settled outcome handed to the caller waiting on a pending entry.
///
/// Success events carry the transaction they were matched with; cancel and
/// error broadcasts have no transaction because the store does not say which
/// purchase the user was interacting with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEvent {
    pub product_id: ProductId,
    pub transaction_id: Option<TransactionId>,
    pub acknowledged: bool,
    pub outcome: TransactionOutcome,
}

impl TransactionEvent {
    /// Broadcast event for a pending product with no matching transaction.
    pub fn broadcast(product_id: ProductId, outcome: TransactionOutcome) -> Self {
        Self {
            product_id,
            transaction_id: None,
            acknowledged: false,
            outcome,
        }
    }
}

/// Terminal value of every purchase and restore call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResult {
    pub success: bool,
    pub is_supporter: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub provider: ProviderKind,
}

impl PurchaseResult {
    /// Successful purchase or restore.
    pub fn succeeded(provider: ProviderKind, is_supporter: bool) -> Self {
        Self {
            success: true,
            is_supporter,
            error: None,
            provider,
        }
    }

    /// Failed call, carrying the stable error code.
    pub fn failed(provider: ProviderKind, error: &BillingError) -> Self {
        Self {
            success: false,
            is_supporter: false,
            error: Some(error.code().to_string()),
            provider,
        }
    }

    /// Whether this result is the dismissible "you cancelled" outcome.
    pub fn is_cancelled(&self) -> bool {
        self.error.as_deref() == Some(BillingError::UserCancelled.code())
    }
}

/// Write applied to the remote profile after a purchase or restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementUpdate {
    pub user_id: UserId,
    pub is_supporter: bool,
    /// Only present on the first transition to supporter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supporter_since: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// The profile columns the reconciler reads.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub is_supporter: Option<bool>,
    pub supporter_since: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}
