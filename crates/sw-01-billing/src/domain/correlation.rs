//! Request ID for purchase correlation.
//!
//! Uses UUID v7 so ids sort by creation time in logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies one `purchase()` call.
///
/// The native store only reports product ids, so this id never reaches the
/// store. It tags the pending entry so a stale timer cannot evict a newer
/// request for the same product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a new request ID (UUID v7)
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse from string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_request_id() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_request_id_display_and_parse() {
        let id = RequestId::new();
        let s = id.to_string();
        assert_eq!(s.len(), 36);
        assert_eq!(RequestId::parse(&s).unwrap(), id);
    }

    #[test]
    fn test_request_id_is_v7() {
        let id = RequestId::new();
        assert_eq!(id.as_uuid().get_version_num(), 7);
    }
}
