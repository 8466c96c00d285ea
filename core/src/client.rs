//! High-level Shareflow API client.
//!
//! # Design
//! Each operation builds a [`Query`] or [`Update`], lets the
//! [`Requester`] perform the single round trip, and decodes/merges the
//! response. Query construction is split into free `build_*` functions so
//! the request shapes are testable without a server. Caller-input
//! validation (ordering keyword, pagination exclusivity, empty file lists)
//! happens before anything touches the network.

use std::path::Path;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::entities::{Comment, Flow, Post, User};
use crate::error::ApiError;
use crate::merge::{merge_flows, merge_posts};
use crate::query::{OrderBy, Query, Update};
use crate::transport::{Requester, DEFAULT_SERVER};

/// Filter for [`Api::get_posts`]. `Default` gives the server defaults:
/// newest 30 posts by creation time, with comments.
#[derive(Debug, Clone)]
pub struct PostFilter {
    pub limit: u32,
    pub include_comments: bool,
    pub flow_id: Option<String>,
    pub order_by: OrderBy,
    pub offset: Option<i64>,
    pub before: Option<chrono::DateTime<chrono::Utc>>,
    pub after: Option<chrono::DateTime<chrono::Utc>>,
    pub search_term: Option<String>,
}

impl Default for PostFilter {
    fn default() -> Self {
        Self {
            limit: 30,
            include_comments: true,
            flow_id: None,
            order_by: OrderBy::Created,
            offset: None,
            before: None,
            after: None,
            search_term: None,
        }
    }
}

/// Synchronous client for one Shareflow account domain.
#[derive(Debug, Clone)]
pub struct Api {
    requester: Requester,
}

impl Api {
    /// Client against the hosted service.
    pub fn new(user_domain: &str, key: &str) -> Self {
        Self::with_server(DEFAULT_SERVER, user_domain, key, true)
    }

    /// Client against a specific server (used by tests and self-hosted
    /// deployments).
    pub fn with_server(server: &str, user_domain: &str, key: &str, use_ssl: bool) -> Self {
        Self { requester: Requester::new(server, user_domain, Some(key.to_string()), use_ssl) }
    }

    pub fn from_requester(requester: Requester) -> Self {
        Self { requester }
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    /// Exchange credentials for an opaque auth key to pass to [`Api::new`].
    pub fn get_auth_token(
        server: &str,
        username: &str,
        password: &str,
        user_domain: &str,
        use_ssl: bool,
    ) -> Result<String, ApiError> {
        Requester::new(server, user_domain, None, use_ssl).get_auth_token(username, password)
    }

    // ----- users -----

    /// List users, either account-wide or scoped to one flow.
    pub fn get_users(
        &self,
        flow_id: Option<&str>,
        offset: Option<i64>,
        limit: u32,
    ) -> Result<Vec<User>, ApiError> {
        let query = build_users_query(flow_id, offset, limit);
        let response = self.requester.api_query(&query)?;
        decode_all(&response, "users", User::decode)
    }

    pub fn get_user(&self, user_id: i64) -> Result<Option<User>, ApiError> {
        let mut query = Query::new("users");
        query.set("id", user_id);
        let response = self.requester.api_query(&query)?;
        Ok(decode_all(&response, "users", User::decode)?.into_iter().next())
    }

    /// Remove a user from a flow's member list.
    pub fn remove_user(&self, user_id: i64, flow_id: &str) -> Result<(), ApiError> {
        let mut update = Update::new("flows");
        update.set("id", flow_id).set("remove_members", json!([user_id]));
        self.requester.api_update(&update)?;
        Ok(())
    }

    // ----- flows -----

    /// List flows with members, owner and invitations resolved.
    pub fn get_flows(
        &self,
        limit: u32,
        order_by: OrderBy,
        name: Option<&str>,
        offset: Option<i64>,
    ) -> Result<Vec<Flow>, ApiError> {
        let query = build_flows_query(limit, order_by, name, offset);
        let response = self.requester.api_query(&query)?;
        merge_flows(&response)
    }

    pub fn get_flow_by_name(&self, name: &str) -> Result<Option<Flow>, ApiError> {
        let flows = self.get_flows(30, OrderBy::Created, Some(name), None)?;
        Ok(flows.into_iter().next())
    }

    /// Create a flow with a client-generated id.
    pub fn create_flow(&self, name: &str) -> Result<Flow, ApiError> {
        let mut update = Update::new("flows");
        update.set("name", name).set("id", new_id());
        let response = self.requester.api_update(&update)?;
        Flow::decode(first_record(&response, "flows")?)
    }

    pub fn update_flow_name(&self, name: &str, flow_id: &str) -> Result<Flow, ApiError> {
        let mut update = Update::new("flows");
        update.set("name", name).set("id", flow_id);
        let response = self.requester.api_update(&update)?;
        Flow::decode(first_record(&response, "flows")?)
    }

    pub fn delete_flow(&self, flow_id: &str) -> Result<(), ApiError> {
        let mut update = Update::new("flows");
        update.set("id", flow_id).mark_removed();
        self.requester.api_update(&update)?;
        Ok(())
    }

    /// Invite email addresses to a flow.
    pub fn create_invitations(&self, flow_id: &str, invitees: &[&str]) -> Result<Flow, ApiError> {
        let mut update = Update::new("flows");
        update.set("id", flow_id).set("invite", json!(invitees));
        let response = self.requester.api_update(&update)?;
        Flow::decode(first_record(&response, "flows")?)
    }

    /// Withdraw pending invitations.
    pub fn delete_invitations(&self, flow_id: &str, invitees: &[&str]) -> Result<Flow, ApiError> {
        let mut update = Update::new("flows");
        update.set("id", flow_id).set("uninvite", json!(invitees));
        let response = self.requester.api_update(&update)?;
        Flow::decode(first_record(&response, "flows")?)
    }

    // ----- posts -----

    /// List posts with files, comments and authors resolved.
    pub fn get_posts(&self, filter: &PostFilter) -> Result<Vec<Post>, ApiError> {
        let query = build_posts_query(filter)?;
        let response = self.requester.api_query(&query)?;
        merge_posts(&self.requester, &response)
    }

    /// Full-text search over posts; other filter options apply unchanged.
    pub fn search(&self, search_term: &str, filter: &PostFilter) -> Result<Vec<Post>, ApiError> {
        let mut filter = filter.clone();
        filter.search_term = Some(search_term.to_string());
        self.get_posts(&filter)
    }

    /// Create a plain post with a client-generated id.
    pub fn create_post(&self, flow_id: &str, content: &str) -> Result<Post, ApiError> {
        let mut update = Update::new("posts");
        update.set("flow_id", flow_id).set("content", content).set("id", new_id());
        let response = self.requester.api_update(&update)?;
        Post::decode(first_record(&response, "posts")?)
    }

    /// Change a post's content and/or attach more files. At least one of
    /// the two must be supplied.
    pub fn update_post(
        &self,
        post_id: &str,
        content: Option<&str>,
        file_paths: &[&Path],
    ) -> Result<Post, ApiError> {
        if content.is_none() && file_paths.is_empty() {
            return Err(ApiError::InvalidArgument(
                "content and file_paths cannot both be empty".into(),
            ));
        }
        let mut update = Update::new("posts");
        update.set("id", post_id);
        if let Some(content) = content {
            update.set("content", content);
        }
        let response = if file_paths.is_empty() {
            self.requester.api_update(&update)?
        } else {
            self.requester.api_update_with_files(&update, file_paths)?
        };
        Post::decode(first_record(&response, "posts")?)
    }

    /// Create a new file post from local paths, all sent in one multipart
    /// exchange.
    pub fn post_files(
        &self,
        file_paths: &[&Path],
        flow_id: &str,
        comment: Option<&str>,
    ) -> Result<(), ApiError> {
        require_paths(file_paths)?;
        let mut update = Update::new("posts");
        update.set("flow_id", flow_id).set("id", new_id());
        if let Some(comment) = comment {
            update.set("content", comment);
        }
        self.requester.api_update_with_files(&update, file_paths)?;
        Ok(())
    }

    /// Attach files to an existing post.
    pub fn add_files_to_post(&self, file_paths: &[&Path], post_id: &str) -> Result<(), ApiError> {
        require_paths(file_paths)?;
        let mut update = Update::new("posts");
        update.set("id", post_id);
        self.requester.api_update_with_files(&update, file_paths)?;
        Ok(())
    }

    pub fn delete_post(&self, post_id: &str) -> Result<(), ApiError> {
        let mut update = Update::new("posts");
        update.set("id", post_id).mark_removed();
        self.requester.api_update(&update)?;
        Ok(())
    }

    // ----- comments -----

    pub fn get_comments(&self, post_id: &str) -> Result<Vec<Comment>, ApiError> {
        let mut query = Query::new("comments");
        query.set("post_id", post_id);
        let response = self.requester.api_query(&query)?;
        decode_all(&response, "comments", Comment::decode)
    }

    pub fn create_comment(&self, post_id: &str, content: &str) -> Result<Comment, ApiError> {
        let mut update = Update::new("comments");
        update.set("post_id", post_id).set("id", new_id()).set("content", content);
        let response = self.requester.api_update(&update)?;
        Comment::decode(first_record(&response, "comments")?)
    }

    pub fn delete_comment(&self, comment_id: &str) -> Result<(), ApiError> {
        let mut update = Update::new("comments");
        update.set("id", comment_id).mark_removed();
        self.requester.api_update(&update)?;
        Ok(())
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn require_paths(file_paths: &[&Path]) -> Result<(), ApiError> {
    if file_paths.is_empty() {
        return Err(ApiError::InvalidArgument("file_paths must not be empty".into()));
    }
    Ok(())
}

fn first_record<'a>(response: &'a Value, collection: &'static str) -> Result<&'a Value, ApiError> {
    response
        .get(collection)
        .and_then(Value::as_array)
        .and_then(|records| records.first())
        .ok_or_else(|| {
            ApiError::Decode { entity: collection, message: "response carries no record".into() }
        })
}

fn decode_all<T>(
    response: &Value,
    collection: &str,
    decode: impl Fn(&Value) -> Result<T, ApiError>,
) -> Result<Vec<T>, ApiError> {
    response
        .get(collection)
        .and_then(Value::as_array)
        .map(|records| records.iter().map(&decode).collect())
        .unwrap_or_else(|| Ok(Vec::new()))
}

fn build_users_query(flow_id: Option<&str>, offset: Option<i64>, limit: u32) -> Query {
    let mut query = match flow_id {
        Some(flow_id) => {
            let mut query = Query::new("flows");
            query.set("id", flow_id).include(&["users"]);
            query
        }
        None => Query::new("users"),
    };
    if let Some(offset) = offset {
        query.offset(offset);
    }
    query.limit(limit);
    query
}

fn build_flows_query(
    limit: u32,
    order_by: OrderBy,
    name: Option<&str>,
    offset: Option<i64>,
) -> Query {
    let mut query = Query::new("flows");
    query
        .include(&["memberships", "invitations", "users"])
        .limit(limit)
        .order(order_by);
    if let Some(name) = name {
        query.set("name", name);
    }
    if let Some(offset) = offset {
        query.offset(offset);
    }
    query
}

fn build_posts_query(filter: &PostFilter) -> Result<Query, ApiError> {
    if filter.offset.is_some() && (filter.before.is_some() || filter.after.is_some()) {
        return Err(ApiError::InvalidRequest(
            "offset cannot be specified with before or after".into(),
        ));
    }

    let mut query = Query::new("posts");
    query.order(filter.order_by).limit(filter.limit);

    let mut include = vec!["files"];
    if filter.include_comments {
        include.push("comments");
    }
    query.include(&include);

    if let Some(offset) = filter.offset {
        query.offset(offset);
    }
    if let Some(flow_id) = &filter.flow_id {
        query.set("flow_id", json!({ "in": [flow_id] }));
    }
    if let Some(term) = &filter.search_term {
        query.set("keywords", term.as_str());
    }
    query.time_range(filter.order_by, filter.before, filter.after);

    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn posts_query_carries_order_limit_and_includes() {
        let query = build_posts_query(&PostFilter::default()).unwrap();
        let body = query.body("k");
        let posts = &body["query"]["posts"];
        assert_eq!(posts["order"], "created_at desc");
        assert_eq!(posts["limit"], 30);
        assert_eq!(posts["include"], json!(["files", "comments"]));
    }

    #[test]
    fn posts_query_limit_is_clamped() {
        let filter = PostFilter { limit: 500, ..Default::default() };
        let query = build_posts_query(&filter).unwrap();
        assert_eq!(query.get("limit").unwrap(), 100);

        let filter = PostFilter { limit: 10, ..Default::default() };
        let query = build_posts_query(&filter).unwrap();
        assert_eq!(query.get("limit").unwrap(), 10);
    }

    #[test]
    fn comments_can_be_excluded() {
        let filter = PostFilter { include_comments: false, ..Default::default() };
        let query = build_posts_query(&filter).unwrap();
        assert_eq!(query.get("include").unwrap(), &json!(["files"]));
    }

    #[test]
    fn offset_is_mutually_exclusive_with_time_bounds() {
        let t = Utc.with_ymd_and_hms(2011, 6, 1, 0, 0, 0).unwrap();
        let combos = [
            (Some(t), None),
            (None, Some(t)),
            (Some(t), Some(t)),
        ];
        for (before, after) in combos {
            let filter = PostFilter { offset: Some(10), before, after, ..Default::default() };
            let err = build_posts_query(&filter).unwrap_err();
            assert!(matches!(err, ApiError::InvalidRequest(_)));
        }
    }

    #[test]
    fn offset_alone_is_accepted_and_clamped() {
        let filter = PostFilter { offset: Some(-3), ..Default::default() };
        let query = build_posts_query(&filter).unwrap();
        assert_eq!(query.get("offset").unwrap(), 0);
    }

    #[test]
    fn both_time_bounds_merge_on_the_order_field() {
        let before = Utc.with_ymd_and_hms(2011, 6, 2, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2011, 6, 1, 0, 0, 0).unwrap();
        let filter = PostFilter {
            order_by: OrderBy::Updated,
            before: Some(before),
            after: Some(after),
            ..Default::default()
        };
        let query = build_posts_query(&filter).unwrap();
        let bounds = query.get("updated_at").unwrap();
        assert!(bounds.get("<").is_some() && bounds.get(">").is_some());
    }

    #[test]
    fn flow_scoped_filter_uses_an_in_condition() {
        let filter = PostFilter { flow_id: Some("f-1".into()), ..Default::default() };
        let query = build_posts_query(&filter).unwrap();
        assert_eq!(query.get("flow_id").unwrap(), &json!({"in": ["f-1"]}));
    }

    #[test]
    fn search_term_maps_to_keywords() {
        let filter = PostFilter { search_term: Some("报告".into()), ..Default::default() };
        let query = build_posts_query(&filter).unwrap();
        assert_eq!(query.get("keywords").unwrap(), "报告");
    }

    #[test]
    fn flows_query_requests_side_collections() {
        let query = build_flows_query(30, OrderBy::Updated, Some("general"), None);
        let body = query.body("k");
        let flows = &body["query"]["flows"];
        assert_eq!(flows["include"], json!(["memberships", "invitations", "users"]));
        assert_eq!(flows["order"], "updated_at desc");
        assert_eq!(flows["name"], "general");
    }

    #[test]
    fn users_query_scoped_to_a_flow_goes_through_flows() {
        let query = build_users_query(Some("f-1"), None, 50);
        let body = query.body("k");
        assert_eq!(body["query"]["flows"]["id"], "f-1");
        assert_eq!(body["query"]["flows"]["include"], json!(["users"]));
    }

    #[test]
    fn users_query_unscoped_targets_users() {
        let query = build_users_query(None, Some(20), 50);
        let body = query.body("k");
        assert_eq!(body["query"]["users"]["limit"], 50);
        assert_eq!(body["query"]["users"]["offset"], 20);
    }

    #[test]
    fn empty_file_lists_are_rejected_before_any_request() {
        let api = Api::with_server("localhost:1", "acme", "k", false);
        assert!(matches!(
            api.post_files(&[], "f-1", None),
            Err(ApiError::InvalidArgument(_))
        ));
        assert!(matches!(
            api.add_files_to_post(&[], "p-1"),
            Err(ApiError::InvalidArgument(_))
        ));
    }

    #[test]
    fn update_post_needs_content_or_files() {
        let api = Api::with_server("localhost:1", "acme", "k", false);
        assert!(matches!(
            api.update_post("p-1", None, &[]),
            Err(ApiError::InvalidArgument(_))
        ));
    }
}
