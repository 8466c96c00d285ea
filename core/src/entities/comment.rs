//! Short replies attached to a post.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::User;
use crate::error::ApiError;

/// A reply to a post. `author` is attached by the response merger when a
/// `users` side collection is present.
#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    pub id: String,
    #[serde(default)]
    pub flow_id: Option<String>,
    #[serde(default)]
    pub flow_name: Option<String>,
    /// Id of the post this comment replies to.
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(skip)]
    pub author: Option<User>,
}

impl Comment {
    pub fn decode(record: &Value) -> Result<Self, ApiError> {
        serde_json::from_value(record.clone()).map_err(|e| ApiError::decode("comment", e))
    }

    /// Comparator for sorting comments by creation time.
    pub fn by_created_at(a: &Comment, b: &Comment) -> Ordering {
        a.created_at.cmp(&b.created_at)
    }
}

impl PartialEq for Comment {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Comment {}
