//! Flows (channels) and the invitations attached to them.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::User;
use crate::error::ApiError;

/// A named channel of posts. The member list, owner and invitations are
/// populated by the response merger when the corresponding side collections
/// were requested; a freshly decoded flow has them empty.
#[derive(Debug, Clone, Deserialize)]
pub struct Flow {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "default_channel")]
    pub is_default: bool,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub quota_percentage: f64,
    #[serde(default, deserialize_with = "super::lenient_i64")]
    pub quota_count: i64,
    #[serde(default)]
    pub rss_url: Option<String>,

    #[serde(skip)]
    pub members: Vec<User>,
    #[serde(skip)]
    pub owner: Option<User>,
    #[serde(skip)]
    pub owner_id: Option<i64>,
    #[serde(skip)]
    pub invitations: Vec<Invitation>,
}

impl Flow {
    pub fn decode(record: &Value) -> Result<Self, ApiError> {
        serde_json::from_value(record.clone()).map_err(|e| ApiError::decode("flow", e))
    }

    /// Comparator for sorting flows by creation time.
    pub fn by_created_at(a: &Flow, b: &Flow) -> Ordering {
        a.created_at.cmp(&b.created_at)
    }
}

impl PartialEq for Flow {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Flow {}

/// A pending invitation to join a flow.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Invitation {
    pub id: String,
    #[serde(rename = "email_address")]
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_with_coercions() {
        let flow = Flow::decode(&json!({
            "id": "f-1",
            "name": "general",
            "created_at": "2011-06-01T12:00:00Z",
            "default_channel": true,
            "quota_percentage": 12.5,
            "quota_count": "3",
            "server_internal": "dropped",
        }))
        .unwrap();
        assert_eq!(flow.name.as_deref(), Some("general"));
        assert!(flow.is_default);
        assert_eq!(flow.quota_count, 3);
        assert!(flow.members.is_empty());
        assert!(flow.owner.is_none());
        assert!(flow.invitations.is_empty());
    }

    #[test]
    fn absent_fields_default() {
        let flow = Flow::decode(&json!({"id": "f-2"})).unwrap();
        assert!(flow.name.is_none());
        assert!(flow.created_at.is_none());
        assert_eq!(flow.quota_count, 0);
        assert!(!flow.is_default);
    }

    #[test]
    fn unparsable_timestamp_fails() {
        let err = Flow::decode(&json!({"id": "f-3", "created_at": "yesterday"})).unwrap_err();
        assert!(matches!(err, ApiError::Decode { entity: "flow", .. }));
    }

    #[test]
    fn ordering_is_by_creation_time() {
        let older = Flow::decode(&json!({
            "id": "z", "created_at": "2011-01-01T00:00:00Z"
        }))
        .unwrap();
        let newer = Flow::decode(&json!({
            "id": "a", "created_at": "2011-06-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(Flow::by_created_at(&older, &newer), Ordering::Less);
    }

    #[test]
    fn invitation_decodes_wire_email_address() {
        let inv: Invitation =
            serde_json::from_value(json!({"id": "i-1", "email_address": "x@example.com"}))
                .unwrap();
        assert_eq!(inv.email, "x@example.com");
    }
}
