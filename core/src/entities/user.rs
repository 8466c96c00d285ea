//! A member of the account, referenced from flows, posts and comments.

use std::cmp::Ordering;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;

/// A Shareflow user. Equality is by id; sorting uses
/// [`User::by_last_name`], never id order.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    #[serde(default = "default_user_id")]
    pub id: i64,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default, rename = "online")]
    pub is_online: bool,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
}

fn default_user_id() -> i64 {
    -1
}

impl User {
    pub fn decode(record: &Value) -> Result<Self, ApiError> {
        serde_json::from_value(record.clone()).map_err(|e| ApiError::decode("user", e))
    }

    /// Comparator for sorting users by last name. Kept as a named function
    /// rather than an `Ord` impl because equality is by id and the two
    /// orders disagree.
    pub fn by_last_name(a: &User, b: &User) -> Ordering {
        a.last_name.cmp(&b.last_name)
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for User {}
