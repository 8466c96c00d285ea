//! Response merging: from one raw JSON response to a populated object graph.
//!
//! A response is a mapping from collection name to a list of raw records.
//! The primary collection (`posts` or `flows`) is decoded in server order;
//! every side collection present is decoded into an id-indexed lookup and
//! cross-references are resolved through it. A referenced id missing from a
//! present side table fails the whole merge with
//! [`ApiError::DanglingReference`]; a side table that was not requested at
//! all resolves nothing.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::entities::{Comment, File, Flow, Invitation, Post, User};
use crate::error::ApiError;
use crate::transport::Requester;

/// Wire record linking a user to a flow.
#[derive(Deserialize)]
struct Membership {
    channel_id: String,
    user_id: i64,
    #[serde(default)]
    administrator: bool,
}

/// Wire record of a pending invitation, carrying its owning flow id.
#[derive(Deserialize)]
struct RawInvitation {
    id: String,
    channel_id: String,
    email_address: String,
}

/// Merge a posts response: decode posts in server order, then resolve each
/// post's files, comments and author through the side tables.
pub fn merge_posts(requester: &Requester, response: &Value) -> Result<Vec<Post>, ApiError> {
    let records = collection(response, "posts");
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let mut posts = records.iter().map(Post::decode).collect::<Result<Vec<_>, _>>()?;

    let files = side_table(response, "files", |r| {
        File::decode(requester, r).map(|f| (f.id.clone(), f))
    })?;
    let comments = side_table(response, "comments", |r| {
        Comment::decode(r).map(|c| (c.id.clone(), c))
    })?;
    let users = user_table(response)?;

    for post in &mut posts {
        if let Some(files) = &files {
            post.files = post
                .file_ids
                .iter()
                .map(|id| lookup(files, id, "files"))
                .collect::<Result<_, _>>()?;
        }
        if let Some(comments) = &comments {
            post.comments = post
                .reply_ids
                .iter()
                .map(|id| lookup(comments, id, "comments"))
                .collect::<Result<_, _>>()?;
            if let Some(users) = &users {
                for comment in &mut post.comments {
                    if let Some(user_id) = comment.user_id {
                        comment.author = Some(lookup(users, &user_id, "users")?);
                    }
                }
            }
        }
        if let (Some(users), Some(user_id)) = (&users, post.user_id) {
            post.author = Some(lookup(users, &user_id, "users")?);
        }
    }

    Ok(posts)
}

/// Merge a flows response: decode flows in server order, then walk
/// `memberships` to populate each flow's member list (marking the
/// administrator as owner) and `invitations` to populate its invitations.
pub fn merge_flows(response: &Value) -> Result<Vec<Flow>, ApiError> {
    let records = collection(response, "flows");
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let mut flows = records.iter().map(Flow::decode).collect::<Result<Vec<_>, _>>()?;
    let index: HashMap<String, usize> = flows
        .iter()
        .enumerate()
        .map(|(i, flow)| (flow.id.clone(), i))
        .collect();

    let users = user_table(response)?;

    for record in collection(response, "memberships") {
        let membership: Membership = serde_json::from_value(record.clone())
            .map_err(|e| ApiError::decode("membership", e))?;
        let flow = &mut flows[*index.get(&membership.channel_id).ok_or_else(|| {
            ApiError::DanglingReference {
                collection: "flows",
                id: membership.channel_id.clone(),
            }
        })?];

        if membership.administrator {
            flow.owner_id = Some(membership.user_id);
        }
        if let Some(users) = &users {
            let user = lookup(users, &membership.user_id, "users")?;
            if membership.administrator {
                flow.owner = Some(user.clone());
            }
            flow.members.push(user);
        }
    }

    for record in collection(response, "invitations") {
        let raw: RawInvitation = serde_json::from_value(record.clone())
            .map_err(|e| ApiError::decode("invitation", e))?;
        let flow = &mut flows[*index.get(&raw.channel_id).ok_or_else(|| {
            ApiError::DanglingReference { collection: "flows", id: raw.channel_id.clone() }
        })?];
        flow.invitations.push(Invitation { id: raw.id, email: raw.email_address });
    }

    Ok(flows)
}

fn collection<'a>(response: &'a Value, name: &str) -> &'a [Value] {
    response
        .get(name)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Decode a side collection into an id-indexed lookup, or `None` when the
/// collection is absent from the response.
fn side_table<T>(
    response: &Value,
    name: &str,
    decode: impl Fn(&Value) -> Result<(String, T), ApiError>,
) -> Result<Option<HashMap<String, T>>, ApiError> {
    let Some(records) = response.get(name).and_then(Value::as_array) else {
        return Ok(None);
    };
    records.iter().map(&decode).collect::<Result<_, _>>().map(Some)
}

fn user_table(response: &Value) -> Result<Option<HashMap<i64, User>>, ApiError> {
    let Some(records) = response.get("users").and_then(Value::as_array) else {
        return Ok(None);
    };
    records
        .iter()
        .map(|r| User::decode(r).map(|u| (u.id, u)))
        .collect::<Result<_, _>>()
        .map(Some)
}

fn lookup<K, T>(table: &HashMap<K, T>, id: &K, collection: &'static str) -> Result<T, ApiError>
where
    K: std::hash::Hash + Eq + ToString,
    T: Clone,
{
    table.get(id).cloned().ok_or_else(|| ApiError::DanglingReference {
        collection,
        id: id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn requester() -> Requester {
        Requester::new("api.example.com", "acme", Some("k".into()), false)
    }

    #[test]
    fn empty_posts_short_circuits_even_with_side_tables() {
        let response = json!({
            "posts": [],
            "users": [{"id": 1}],
            "files": [{"id": "fi-1"}],
        });
        assert!(merge_posts(&requester(), &response).unwrap().is_empty());
    }

    #[test]
    fn missing_primary_collection_is_treated_as_empty() {
        assert!(merge_posts(&requester(), &json!({})).unwrap().is_empty());
        assert!(merge_flows(&json!({})).unwrap().is_empty());
    }

    #[test]
    fn posts_keep_server_order_and_resolve_references() {
        let response = json!({
            "posts": [
                {"id": "p-2", "post_type": "comment", "file_ids": ["fi-1"],
                 "reply_ids": ["c-1"], "user_id": 1},
                {"id": "p-1", "post_type": "comment", "user_id": 2},
            ],
            "files": [{"id": "fi-1", "file_name": "a.txt"}],
            "comments": [{"id": "c-1", "reply_to": "p-2", "user_id": 2}],
            "users": [
                {"id": 1, "last_name": "Hopper"},
                {"id": 2, "last_name": "Knuth"},
            ],
        });
        let posts = merge_posts(&requester(), &response).unwrap();
        assert_eq!(posts.len(), 2);
        // Server order is preserved even though ids sort the other way.
        assert_eq!(posts[0].id, "p-2");
        assert_eq!(posts[1].id, "p-1");
        assert_eq!(posts[0].files[0].file_name.as_deref(), Some("a.txt"));
        assert_eq!(posts[0].comments[0].id, "c-1");
        assert_eq!(posts[0].comments[0].author.as_ref().unwrap().id, 2);
        assert_eq!(posts[0].author.as_ref().unwrap().id, 1);
        assert_eq!(posts[1].author.as_ref().unwrap().id, 2);
    }

    #[test]
    fn absent_side_tables_resolve_nothing() {
        let response = json!({
            "posts": [{"id": "p-1", "file_ids": ["fi-1"], "reply_ids": ["c-1"], "user_id": 9}],
        });
        let posts = merge_posts(&requester(), &response).unwrap();
        assert!(posts[0].files.is_empty());
        assert!(posts[0].comments.is_empty());
        assert!(posts[0].author.is_none());
    }

    #[test]
    fn dangling_file_reference_fails_the_merge() {
        let response = json!({
            "posts": [{"id": "p-1", "file_ids": ["fi-1", "fi-2"]}],
            "files": [{"id": "fi-1"}],
        });
        let err = merge_posts(&requester(), &response).unwrap_err();
        assert!(matches!(
            err,
            ApiError::DanglingReference { collection: "files", ref id } if id == "fi-2"
        ));
    }

    #[test]
    fn dangling_author_fails_the_merge() {
        let response = json!({
            "posts": [{"id": "p-1", "user_id": 3}],
            "users": [{"id": 1}],
        });
        let err = merge_posts(&requester(), &response).unwrap_err();
        assert!(matches!(err, ApiError::DanglingReference { collection: "users", .. }));
    }

    #[test]
    fn flow_merge_attaches_members_owner_and_invitations() {
        let response = json!({
            "flows": [{"id": "f-1", "name": "general"}],
            "memberships": [
                {"channel_id": "f-1", "user_id": 1, "administrator": false},
                {"channel_id": "f-1", "user_id": 2, "administrator": true},
            ],
            "users": [
                {"id": 1, "last_name": "Hopper"},
                {"id": 2, "last_name": "Liskov"},
            ],
            "invitations": [
                {"id": "i-1", "channel_id": "f-1", "email_address": "new@example.com"},
            ],
        });
        let flows = merge_flows(&response).unwrap();
        assert_eq!(flows.len(), 1);
        let flow = &flows[0];
        assert_eq!(flow.owner_id, Some(2));
        let owner = flow.owner.as_ref().unwrap();
        assert_eq!(owner.id, 2);
        assert!(flow.members.iter().any(|u| u.id == 2), "owner is also a member");
        assert_eq!(flow.members.len(), 2);
        assert_eq!(flow.invitations[0].email, "new@example.com");
    }

    #[test]
    fn flow_merge_without_users_still_records_owner_id() {
        let response = json!({
            "flows": [{"id": "f-1"}],
            "memberships": [{"channel_id": "f-1", "user_id": 5, "administrator": true}],
        });
        let flows = merge_flows(&response).unwrap();
        assert_eq!(flows[0].owner_id, Some(5));
        assert!(flows[0].owner.is_none());
        assert!(flows[0].members.is_empty());
    }

    #[test]
    fn membership_for_unknown_flow_fails_the_merge() {
        let response = json!({
            "flows": [{"id": "f-1"}],
            "memberships": [{"channel_id": "f-9", "user_id": 1, "administrator": false}],
        });
        let err = merge_flows(&response).unwrap_err();
        assert!(matches!(err, ApiError::DanglingReference { collection: "flows", .. }));
    }

    #[test]
    fn flows_keep_server_order() {
        let response = json!({
            "flows": [
                {"id": "b", "created_at": "2011-06-01T00:00:00Z"},
                {"id": "a", "created_at": "2011-01-01T00:00:00Z"},
            ],
        });
        let flows = merge_flows(&response).unwrap();
        assert_eq!(flows[0].id, "b");
        assert_eq!(flows[1].id, "a");
    }

    #[test]
    fn unknown_post_type_survives_the_merge_as_plain() {
        let response = json!({
            "posts": [{"id": "p-1", "post_type": "hologram"}],
        });
        let posts = merge_posts(&requester(), &response).unwrap();
        assert!(!posts[0].is_map());
        assert_eq!(posts[0].post_type.as_deref(), Some("hologram"));
    }
}
