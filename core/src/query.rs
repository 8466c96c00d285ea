//! Request builders for the two Shareflow payload shapes.
//!
//! Reads use `{"query": {<entity>: {<field>: <value>, ...}}}` and writes use
//! `{"data": {<entity>: [{<field>: <value>, ...}]}}`, a single-element
//! batch. Both builders keep their fields in an ordered map with named
//! setters for the well-known fields and [`Query::set`]/[`Update::set`] as
//! an escape hatch for everything else. The server is the source of truth
//! for valid field names; the only client-side checks are the ordering
//! keyword and the pagination clamps.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use crate::error::ApiError;

/// Maximum page size accepted by the server; larger requests are clamped.
pub const MAX_LIMIT: u32 = 100;

/// Sort key for list queries. The server orders on `created_at` or
/// `updated_at` descending; no other column is sortable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderBy {
    #[default]
    Created,
    Updated,
}

impl OrderBy {
    /// Name of the timestamp field this key sorts on.
    pub fn field(self) -> &'static str {
        match self {
            OrderBy::Created => "created_at",
            OrderBy::Updated => "updated_at",
        }
    }

    /// Value for the query `order` field.
    fn clause(self) -> String {
        format!("{} desc", self.field())
    }
}

impl FromStr for OrderBy {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(OrderBy::Created),
            "updated" => Ok(OrderBy::Updated),
            other => Err(ApiError::InvalidArgument(format!(
                "order_by must be one of 'updated', 'created', got '{other}'"
            ))),
        }
    }
}

/// Builder for a read request against one entity collection.
#[derive(Debug, Clone)]
pub struct Query {
    entity: String,
    fields: Map<String, Value>,
}

impl Query {
    pub fn new(entity: &str) -> Self {
        Self { entity: entity.to_string(), fields: Map::new() }
    }

    /// Set an arbitrary field. Last write wins.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    /// Read back a previously set field. Reading an unset field is an
    /// error, not a default.
    pub fn get(&self, field: &str) -> Result<&Value, ApiError> {
        self.fields
            .get(field)
            .ok_or_else(|| ApiError::FieldNotSet(field.to_string()))
    }

    /// Page size, clamped to [`MAX_LIMIT`].
    pub fn limit(&mut self, limit: u32) -> &mut Self {
        self.set("limit", limit.min(MAX_LIMIT))
    }

    /// Page offset, clamped to non-negative.
    pub fn offset(&mut self, offset: i64) -> &mut Self {
        self.set("offset", offset.max(0))
    }

    /// Sort order, always descending on the key's timestamp field.
    pub fn order(&mut self, order_by: OrderBy) -> &mut Self {
        self.set("order", order_by.clause())
    }

    /// Side collections to include in the response.
    pub fn include(&mut self, collections: &[&str]) -> &mut Self {
        self.set("include", json!(collections))
    }

    /// Upper/lower bounds on the ordering timestamp, merged into a single
    /// field-level condition map (`{"<": ts, ">": ts}`). Both bounds may be
    /// present at once. No-op when both are `None`.
    pub fn time_range(
        &mut self,
        order_by: OrderBy,
        before: Option<DateTime<Utc>>,
        after: Option<DateTime<Utc>>,
    ) -> &mut Self {
        let mut bounds = Map::new();
        if let Some(before) = before {
            bounds.insert("<".to_string(), Value::String(before.to_rfc3339()));
        }
        if let Some(after) = after {
            bounds.insert(">".to_string(), Value::String(after.to_rfc3339()));
        }
        if !bounds.is_empty() {
            self.set(order_by.field(), Value::Object(bounds));
        }
        self
    }

    /// Full request body with the auth key attached.
    pub fn body(&self, key: &str) -> Value {
        let mut query = Map::new();
        query.insert(self.entity.clone(), Value::Object(self.fields.clone()));
        json!({ "query": query, "key": key })
    }
}

/// Builder for a write request against one entity collection.
#[derive(Debug, Clone)]
pub struct Update {
    entity: String,
    fields: Map<String, Value>,
}

impl Update {
    pub fn new(entity: &str) -> Self {
        Self { entity: entity.to_string(), fields: Map::new() }
    }

    /// Set an arbitrary field. Last write wins.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    /// Read back a previously set field.
    pub fn get(&self, field: &str) -> Result<&Value, ApiError> {
        self.fields
            .get(field)
            .ok_or_else(|| ApiError::FieldNotSet(field.to_string()))
    }

    /// Mark the record for deletion. The server treats `_removed: true` as a
    /// soft-delete instruction.
    pub fn mark_removed(&mut self) -> &mut Self {
        self.set("_removed", true)
    }

    /// The `data` payload alone, without the key. This is what the `data`
    /// part of a multipart upload carries.
    pub fn data(&self) -> Value {
        let mut data = Map::new();
        data.insert(
            self.entity.clone(),
            Value::Array(vec![Value::Object(self.fields.clone())]),
        );
        Value::Object(data)
    }

    /// Full request body with the auth key attached.
    pub fn body(&self, key: &str) -> Value {
        json!({ "data": self.data(), "key": key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn order_by_parses_the_two_valid_keywords() {
        assert_eq!("created".parse::<OrderBy>().unwrap(), OrderBy::Created);
        assert_eq!("updated".parse::<OrderBy>().unwrap(), OrderBy::Updated);
    }

    #[test]
    fn order_by_rejects_anything_else() {
        for bad in ["newest", "id", "", "Created"] {
            let err = bad.parse::<OrderBy>().unwrap_err();
            assert!(matches!(err, ApiError::InvalidArgument(_)), "{bad}");
        }
    }

    #[test]
    fn query_body_has_the_query_shape() {
        let mut q = Query::new("flows");
        q.set("name", "general").limit(30);
        let body = q.body("k1");
        assert_eq!(body["query"]["flows"]["name"], "general");
        assert_eq!(body["query"]["flows"]["limit"], 30);
        assert_eq!(body["key"], "k1");
    }

    #[test]
    fn limit_is_clamped_to_100() {
        let mut q = Query::new("posts");
        q.limit(500);
        assert_eq!(q.get("limit").unwrap(), 100);
        q.limit(10);
        assert_eq!(q.get("limit").unwrap(), 10);
    }

    #[test]
    fn offset_is_clamped_to_non_negative() {
        let mut q = Query::new("posts");
        q.offset(-5);
        assert_eq!(q.get("offset").unwrap(), 0);
        q.offset(40);
        assert_eq!(q.get("offset").unwrap(), 40);
    }

    #[test]
    fn reading_an_unset_field_is_an_error() {
        let q = Query::new("posts");
        assert!(matches!(q.get("limit"), Err(ApiError::FieldNotSet(_))));
    }

    #[test]
    fn setting_a_field_twice_keeps_the_last_value() {
        let mut q = Query::new("posts");
        q.set("keywords", "a").set("keywords", "b");
        assert_eq!(q.get("keywords").unwrap(), "b");
    }

    #[test]
    fn time_range_merges_both_bounds_on_the_order_field() {
        let before = Utc.with_ymd_and_hms(2011, 6, 2, 12, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2011, 6, 1, 12, 0, 0).unwrap();
        let mut q = Query::new("posts");
        q.time_range(OrderBy::Updated, Some(before), Some(after));
        let bounds = q.get("updated_at").unwrap();
        assert_eq!(bounds["<"], before.to_rfc3339());
        assert_eq!(bounds[">"], after.to_rfc3339());
    }

    #[test]
    fn time_range_without_bounds_sets_nothing() {
        let mut q = Query::new("posts");
        q.time_range(OrderBy::Created, None, None);
        assert!(q.get("created_at").is_err());
    }

    #[test]
    fn update_body_is_a_single_element_batch() {
        let mut u = Update::new("flows");
        u.set("name", "announcements").set("id", "f-1");
        let body = u.body("k2");
        assert_eq!(body["data"]["flows"][0]["name"], "announcements");
        assert_eq!(body["data"]["flows"][0]["id"], "f-1");
        assert_eq!(body["key"], "k2");
    }

    #[test]
    fn mark_removed_sets_the_soft_delete_marker() {
        let mut u = Update::new("posts");
        u.set("id", "p-1").mark_removed();
        assert_eq!(u.data()["posts"][0]["_removed"], true);
    }

    #[test]
    fn update_data_omits_the_key() {
        let mut u = Update::new("posts");
        u.set("id", "p-1");
        let data = u.data();
        assert!(data.get("key").is_none());
        assert_eq!(data["posts"][0]["id"], "p-1");
    }
}
