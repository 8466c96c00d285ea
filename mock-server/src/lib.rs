//! In-memory mock of the hosted Shareflow API, used by integration tests.
//!
//! Implements the single JSON endpoint (`query` and `data` payloads,
//! including multipart uploads), the auth exchange, keyed content
//! downloads, and a gzip-encoded fixture route for exercising transparent
//! response decompression. Data lives in a seeded in-memory store.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use axum::{
    extract::{FromRequest, Multipart, Path, Query as UrlQuery, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Password accepted by the auth endpoint for every seeded login.
pub const PASSWORD: &str = "s3cret";

/// Auth token handed out by the auth endpoint.
pub const AUTH_TOKEN: &str = "tok-mock";

pub type Db = Arc<RwLock<Store>>;

/// Raw records as the server would hand them out, keyed by collection.
pub struct Store {
    pub users: Vec<Value>,
    pub flows: Vec<Value>,
    pub memberships: Vec<Value>,
    pub invitations: Vec<Value>,
    pub posts: Vec<Value>,
    pub comments: Vec<Value>,
    pub files: Vec<Value>,
    /// Server-relative content path -> raw bytes.
    pub contents: HashMap<String, Vec<u8>>,
}

impl Store {
    /// Fixture: one flow with two members (one administrator) and a pending
    /// invitation, plus a plain post with a comment, a map post, and an
    /// email post whose message body lives in a tagged file attachment.
    pub fn seeded() -> Self {
        let mut contents = HashMap::new();
        contents.insert(
            "/files/fi-email/message.eml".to_string(),
            b"Subject: Quarterly numbers\r\n\r\nSee attached.".to_vec(),
        );

        Store {
            users: vec![
                json!({"id": 1, "login": "grace", "first_name": "Grace",
                       "last_name": "Hopper", "email": "grace@example.com",
                       "online": true, "role": "member", "time_zone": "US/Eastern"}),
                json!({"id": 2, "login": "barbara", "first_name": "Barbara",
                       "last_name": "Liskov", "email": "barbara@example.com",
                       "online": false, "role": "admin", "time_zone": "US/Eastern"}),
            ],
            flows: vec![json!({
                "id": "f-general", "name": "general",
                "email_address": "general@mock.example.com",
                "created_at": "2011-05-01T09:00:00Z",
                "updated_at": "2011-06-01T12:30:00Z",
                "default_channel": true, "owner_name": "Barbara Liskov",
                "quota_percentage": 12.5, "quota_count": "3",
                "rss_url": "/f-general/rss",
            })],
            memberships: vec![
                json!({"id": "m-1", "channel_id": "f-general", "user_id": 1,
                       "administrator": false}),
                json!({"id": "m-2", "channel_id": "f-general", "user_id": 2,
                       "administrator": true}),
            ],
            invitations: vec![json!({
                "id": "i-1", "channel_id": "f-general",
                "email_address": "invitee@example.com",
            })],
            posts: vec![
                json!({"id": "p-email", "flow_id": "f-general", "post_type": "message",
                       "user_id": 1, "file_ids": ["fi-email"], "reply_ids": [],
                       "created_at": "2011-06-01T12:20:00Z",
                       "updated_at": "2011-06-01T12:20:00Z"}),
                json!({"id": "p-map", "flow_id": "f-general", "post_type": "map",
                       "user_id": 1,
                       "content": "{\"address\": \"1 Main St\", \"point\": [37.77, -122.41]}",
                       "file_ids": [], "reply_ids": [],
                       "created_at": "2011-06-01T12:10:00Z",
                       "updated_at": "2011-06-01T12:10:00Z"}),
                json!({"id": "p-plain", "flow_id": "f-general", "post_type": "comment",
                       "user_id": 2, "content": "welcome aboard",
                       "file_ids": [], "reply_ids": ["c-1"],
                       "created_at": "2011-06-01T12:00:00Z",
                       "updated_at": "2011-06-01T12:05:00Z"}),
            ],
            comments: vec![json!({
                "id": "c-1", "flow_id": "f-general", "flow_name": "general",
                "reply_to": "p-plain", "content": "thanks!", "user_id": 1,
                "created_at": "2011-06-01T12:05:00Z",
            })],
            files: vec![json!({
                "id": "fi-email", "post_id": "p-email", "file_name": "message.eml",
                "file_size": "44", "content_type": "message/rfc822", "is_image": false,
                "meta_data": "{\"attachment_type\": \"email_message\", \
                              \"subject\": \"Quarterly numbers\", \
                              \"sender_display_name\": \"Grace Hopper\", \
                              \"summary\": \"see attached\"}",
                "url": "/files/fi-email/message.eml",
                "created_at": "2011-06-01T12:20:00Z",
            })],
            contents,
        }
    }
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::seeded()));
    Router::new()
        .route("/{domain}/shareflow/api/v2.json", post(api))
        .route("/{domain}/shareflow/api/v2/auth.json", post(auth))
        .route("/{domain}/files/{id}/{name}", get(content))
        .route("/{domain}/gzip.json", get(gzip_fixture))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

async fn auth(State(db): State<Db>, Json(body): Json<Value>) -> Response {
    let login = body["login"].as_str().unwrap_or_default();
    let known = db
        .read()
        .await
        .users
        .iter()
        .any(|u| u["login"].as_str() == Some(login));
    if !known || body["password"].as_str() != Some(PASSWORD) {
        return error(StatusCode::FORBIDDEN, "invalid credentials");
    }
    Json(json!({ "data": { "auth_token": AUTH_TOKEN } })).into_response()
}

async fn api(State(db): State<Db>, request: Request) -> Response {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        let multipart = match Multipart::from_request(request, &()).await {
            Ok(mp) => mp,
            Err(_) => return error(StatusCode::BAD_REQUEST, "malformed multipart body"),
        };
        return api_multipart(db, multipart).await;
    }

    let bytes = match axum::body::to_bytes(request.into_body(), 1 << 20).await {
        Ok(bytes) => bytes,
        Err(_) => return error(StatusCode::BAD_REQUEST, "unreadable body"),
    };
    let body: Value = match serde_json::from_slice(&bytes) {
        Ok(body) => body,
        Err(_) => return error(StatusCode::BAD_REQUEST, "body is not JSON"),
    };

    if body["key"].as_str().unwrap_or_default().is_empty() {
        return error(StatusCode::FORBIDDEN, "missing key");
    }

    if let Some(query) = body.get("query") {
        return handle_query(&*db.read().await, query);
    }
    if let Some(data) = body.get("data") {
        return handle_data(&mut *db.write().await, data, Vec::new());
    }
    error(StatusCode::BAD_REQUEST, "neither query nor data")
}

struct UploadedFile {
    part_id: String,
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
}

async fn api_multipart(db: Db, mut multipart: Multipart) -> Response {
    let mut key = String::new();
    let mut data: Option<Value> = None;
    let mut uploads = Vec::new();

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "key" => key = field.text().await.unwrap_or_default(),
            "data" => {
                let text = field.text().await.unwrap_or_default();
                data = serde_json::from_str(&text).ok();
            }
            part_id if part_id.starts_with("file_") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.unwrap_or_default().to_vec();
                uploads.push(UploadedFile {
                    part_id: part_id.to_string(),
                    file_name,
                    content_type,
                    bytes,
                });
            }
            _ => {}
        }
    }

    if key.is_empty() {
        return error(StatusCode::FORBIDDEN, "missing key");
    }
    let Some(data) = data else {
        return error(StatusCode::BAD_REQUEST, "multipart body carries no data part");
    };
    handle_data(&mut *db.write().await, &data, uploads)
}

/// Single-entry object `{entity: fields}` -> `(entity, fields)`.
fn single_entry(value: &Value) -> Option<(&str, &Value)> {
    let object = value.as_object()?;
    let (entity, fields) = object.iter().next()?;
    Some((entity.as_str(), fields))
}

fn includes(fields: &Value) -> Vec<&str> {
    fields["include"]
        .as_array()
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn apply_limit(records: &mut Vec<Value>, fields: &Value) {
    if let Some(limit) = fields["limit"].as_u64() {
        records.truncate(limit as usize);
    }
}

fn handle_query(store: &Store, query: &Value) -> Response {
    let Some((entity, fields)) = single_entry(query) else {
        return error(StatusCode::BAD_REQUEST, "empty query");
    };

    match entity {
        "flows" => query_flows(store, fields),
        "posts" => query_posts(store, fields),
        "users" => query_users(store, fields),
        "comments" => query_comments(store, fields),
        // Fixed fixtures for exercising the client's status mapping.
        "secrets" => error(StatusCode::FORBIDDEN, "secrets are off limits"),
        "explode" => error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
        other => error(StatusCode::BAD_REQUEST, &format!("unknown entity {other}")),
    }
}

fn query_flows(store: &Store, fields: &Value) -> Response {
    let mut flows: Vec<Value> = store
        .flows
        .iter()
        .filter(|f| fields["id"].as_str().map_or(true, |id| f["id"] == id))
        .filter(|f| fields["name"].as_str().map_or(true, |name| f["name"] == name))
        .cloned()
        .collect();
    apply_limit(&mut flows, fields);

    let flow_ids: Vec<&str> = flows.iter().filter_map(|f| f["id"].as_str()).collect();
    let memberships: Vec<&Value> = store
        .memberships
        .iter()
        .filter(|m| flow_ids.contains(&m["channel_id"].as_str().unwrap_or_default()))
        .collect();

    let mut response = json!({ "flows": flows });
    for include in includes(fields) {
        match include {
            "memberships" => response["memberships"] = json!(memberships),
            "invitations" => {
                let invitations: Vec<&Value> = store
                    .invitations
                    .iter()
                    .filter(|i| {
                        flow_ids.contains(&i["channel_id"].as_str().unwrap_or_default())
                    })
                    .collect();
                response["invitations"] = json!(invitations);
            }
            "users" => {
                let member_ids: Vec<i64> =
                    memberships.iter().filter_map(|m| m["user_id"].as_i64()).collect();
                let users: Vec<&Value> = store
                    .users
                    .iter()
                    .filter(|u| member_ids.contains(&u["id"].as_i64().unwrap_or(-1)))
                    .collect();
                response["users"] = json!(users);
            }
            _ => {}
        }
    }
    Json(response).into_response()
}

fn query_posts(store: &Store, fields: &Value) -> Response {
    let flow_filter: Option<Vec<&str>> = fields["flow_id"]["in"]
        .as_array()
        .map(|a| a.iter().filter_map(Value::as_str).collect());

    let mut posts: Vec<Value> = store
        .posts
        .iter()
        .filter(|p| {
            flow_filter
                .as_ref()
                .map_or(true, |ids| ids.contains(&p["flow_id"].as_str().unwrap_or_default()))
        })
        .filter(|p| {
            fields["keywords"]
                .as_str()
                .map_or(true, |kw| p["content"].as_str().unwrap_or_default().contains(kw))
        })
        .cloned()
        .collect();
    apply_limit(&mut posts, fields);

    let file_ids: Vec<&str> = posts
        .iter()
        .filter_map(|p| p["file_ids"].as_array())
        .flatten()
        .filter_map(Value::as_str)
        .collect();
    let reply_ids: Vec<&str> = posts
        .iter()
        .filter_map(|p| p["reply_ids"].as_array())
        .flatten()
        .filter_map(Value::as_str)
        .collect();

    let mut response = json!({ "posts": posts });
    for include in includes(fields) {
        match include {
            "files" => {
                let files: Vec<&Value> = store
                    .files
                    .iter()
                    .filter(|f| file_ids.contains(&f["id"].as_str().unwrap_or_default()))
                    .collect();
                response["files"] = json!(files);
            }
            "comments" => {
                let comments: Vec<&Value> = store
                    .comments
                    .iter()
                    .filter(|c| reply_ids.contains(&c["id"].as_str().unwrap_or_default()))
                    .collect();
                response["comments"] = json!(comments);
            }
            _ => {}
        }
    }
    Json(response).into_response()
}

fn query_users(store: &Store, fields: &Value) -> Response {
    let offset = fields["offset"].as_u64().unwrap_or(0) as usize;
    let mut users: Vec<Value> = store
        .users
        .iter()
        .filter(|u| fields["id"].as_i64().map_or(true, |id| u["id"] == id))
        .skip(offset)
        .cloned()
        .collect();
    apply_limit(&mut users, fields);
    Json(json!({ "users": users })).into_response()
}

fn query_comments(store: &Store, fields: &Value) -> Response {
    let comments: Vec<&Value> = store
        .comments
        .iter()
        .filter(|c| {
            fields["post_id"].as_str().map_or(true, |id| c["reply_to"] == id)
        })
        .collect();
    Json(json!({ "comments": comments })).into_response()
}

fn handle_data(store: &mut Store, data: &Value, uploads: Vec<UploadedFile>) -> Response {
    let Some((entity, records)) = single_entry(data) else {
        return error(StatusCode::BAD_REQUEST, "empty data");
    };
    let Some(record) = records.as_array().and_then(|r| r.first()) else {
        return error(StatusCode::BAD_REQUEST, "data carries no record");
    };

    match entity {
        "flows" => update_flows(store, record),
        "posts" => update_posts(store, record, uploads),
        "comments" => update_comments(store, record),
        other => error(StatusCode::BAD_REQUEST, &format!("unknown entity {other}")),
    }
}

fn update_flows(store: &mut Store, record: &Value) -> Response {
    let id = record["id"].as_str().unwrap_or_default().to_string();

    if record["_removed"].as_bool() == Some(true) {
        store.flows.retain(|f| f["id"] != id.as_str());
        return Json(json!({ "flows": [] })).into_response();
    }

    if let Some(invitees) = record["invite"].as_array() {
        for invitee in invitees.iter().filter_map(Value::as_str) {
            store.invitations.push(json!({
                "id": format!("i-{}", Uuid::new_v4().simple()),
                "channel_id": id,
                "email_address": invitee,
            }));
        }
    }
    if let Some(invitees) = record["uninvite"].as_array() {
        let emails: Vec<&str> = invitees.iter().filter_map(Value::as_str).collect();
        store.invitations.retain(|i| {
            i["channel_id"] != id.as_str()
                || !emails.contains(&i["email_address"].as_str().unwrap_or_default())
        });
    }

    let existing = store.flows.iter_mut().find(|f| f["id"] == id.as_str());
    let stored = match existing {
        Some(flow) => {
            if let Some(name) = record["name"].as_str() {
                flow["name"] = json!(name);
                flow["updated_at"] = json!(Utc::now().to_rfc3339());
            }
            flow.clone()
        }
        None => {
            let flow = json!({
                "id": id,
                "name": record["name"],
                "created_at": Utc::now().to_rfc3339(),
                "updated_at": Utc::now().to_rfc3339(),
                "default_channel": false,
                "quota_percentage": 0.0,
                "quota_count": 0,
            });
            store.flows.push(flow.clone());
            flow
        }
    };
    Json(json!({ "flows": [stored] })).into_response()
}

fn update_posts(store: &mut Store, record: &Value, uploads: Vec<UploadedFile>) -> Response {
    let id = record["id"].as_str().unwrap_or_default().to_string();

    if record["_removed"].as_bool() == Some(true) {
        store.posts.retain(|p| p["id"] != id.as_str());
        return Json(json!({ "posts": [] })).into_response();
    }

    let mut file_records = Vec::new();
    for upload in uploads {
        let file_id = format!("fi-{}", Uuid::new_v4().simple());
        let path = format!("/files/{file_id}/{}", upload.file_name);
        store.contents.insert(path.clone(), upload.bytes.clone());
        let file = json!({
            "id": file_id,
            "post_id": id,
            "file_name": upload.file_name,
            "file_size": upload.bytes.len(),
            "content_type": upload.content_type,
            "is_image": upload.content_type.starts_with("image/"),
            "url": path,
            "created_at": Utc::now().to_rfc3339(),
            "part_id": upload.part_id,
        });
        store.files.push(file.clone());
        file_records.push(file);
    }
    let file_ids: Vec<Value> = file_records.iter().map(|f| f["id"].clone()).collect();

    let existing = store.posts.iter_mut().find(|p| p["id"] == id.as_str());
    let stored = match existing {
        Some(post) => {
            if let Some(content) = record["content"].as_str() {
                post["content"] = json!(content);
            }
            if !file_ids.is_empty() {
                let ids = post["file_ids"].as_array().cloned().unwrap_or_default();
                post["file_ids"] = json!([ids, file_ids].concat());
            }
            post["updated_at"] = json!(Utc::now().to_rfc3339());
            post.clone()
        }
        None => {
            let post = json!({
                "id": id,
                "flow_id": record["flow_id"],
                "post_type": if file_ids.is_empty() { "comment" } else { "file" },
                "content": record["content"],
                "user_id": 1,
                "file_ids": file_ids,
                "reply_ids": [],
                "created_at": Utc::now().to_rfc3339(),
                "updated_at": Utc::now().to_rfc3339(),
            });
            store.posts.insert(0, post.clone());
            post
        }
    };
    Json(json!({ "posts": [stored] })).into_response()
}

fn update_comments(store: &mut Store, record: &Value) -> Response {
    let id = record["id"].as_str().unwrap_or_default().to_string();

    if record["_removed"].as_bool() == Some(true) {
        store.comments.retain(|c| c["id"] != id.as_str());
        return Json(json!({ "comments": [] })).into_response();
    }

    let comment = json!({
        "id": id,
        "reply_to": record["post_id"],
        "content": record["content"],
        "user_id": 1,
        "created_at": Utc::now().to_rfc3339(),
    });
    store.comments.push(comment.clone());
    if let Some(post) = store
        .posts
        .iter_mut()
        .find(|p| p["id"] == record["post_id"])
    {
        let mut ids = post["reply_ids"].as_array().cloned().unwrap_or_default();
        ids.push(json!(id));
        post["reply_ids"] = json!(ids);
    }
    Json(json!({ "comments": [comment] })).into_response()
}

async fn content(
    State(db): State<Db>,
    Path((_domain, id, name)): Path<(String, String, String)>,
    UrlQuery(params): UrlQuery<HashMap<String, String>>,
) -> Response {
    if params.get("key").map(String::as_str).unwrap_or_default().is_empty() {
        return error(StatusCode::FORBIDDEN, "missing key");
    }
    let path = format!("/files/{id}/{name}");
    match db.read().await.contents.get(&path) {
        Some(bytes) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes.clone(),
        )
            .into_response(),
        None => error(StatusCode::NOT_FOUND, "no such file"),
    }
}

/// JSON body compressed with gzip and served with Content-Encoding, to
/// exercise the client's transparent decompression.
async fn gzip_fixture() -> Response {
    let payload = serde_json::to_vec(&json!({ "compressed": true })).expect("fixture JSON");
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&payload).expect("gzip fixture");
    let body = encoder.finish().expect("gzip fixture");
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CONTENT_ENCODING, "gzip"),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_store_is_internally_consistent() {
        let store = Store::seeded();
        for membership in &store.memberships {
            let channel = membership["channel_id"].as_str().unwrap();
            assert!(store.flows.iter().any(|f| f["id"] == channel));
            let user = membership["user_id"].as_i64().unwrap();
            assert!(store.users.iter().any(|u| u["id"] == user));
        }
        for file in &store.files {
            let url = file["url"].as_str().unwrap();
            assert!(store.contents.contains_key(url), "missing content for {url}");
        }
    }

    #[test]
    fn seeded_email_file_metadata_parses_as_json() {
        let store = Store::seeded();
        let meta = store.files[0]["meta_data"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(meta).unwrap();
        assert_eq!(parsed["attachment_type"], "email_message");
    }

    #[test]
    fn exactly_one_administrator_in_the_seed() {
        let store = Store::seeded();
        let admins = store
            .memberships
            .iter()
            .filter(|m| m["administrator"] == true)
            .count();
        assert_eq!(admins, 1);
    }
}
