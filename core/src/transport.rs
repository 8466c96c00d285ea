//! Blocking HTTP transport for the Shareflow API.
//!
//! # Design
//! `Requester` owns the endpoint urls and the auth key, executes
//! [`HttpRequest`] values over a fresh ureq agent per call, and hands back
//! [`HttpResponse`] plain data. Status interpretation stays in
//! [`crate::http::check_status`]; ureq's status-as-error behavior is
//! disabled. Response gzip (Content-Encoding) is handled transparently by
//! ureq's `gzip` feature.

use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::ApiError;
use crate::http::{check_status, HttpMethod, HttpRequest, HttpResponse};
use crate::query::{Query, Update};

/// API protocol version spoken by this client.
pub const API_VERSION: u32 = 2;

/// Default host of the hosted service.
pub const DEFAULT_SERVER: &str = "api.zenbe.com";

const USER_AGENT: &str = "shareflow-core APIv2";

const QUERY_TIMEOUT: Duration = Duration::from_secs(60);
const CONTENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Synchronous requester bound to one account domain.
///
/// Cheap to clone; decoded [`crate::entities::File`]s keep a clone so they
/// can materialize urls and bytes on demand.
#[derive(Debug, Clone)]
pub struct Requester {
    base_url: String,
    api_url: String,
    auth_url: String,
    key: Option<String>,
    query_timeout: Duration,
    content_timeout: Duration,
}

impl Requester {
    pub fn new(server: &str, user_domain: &str, key: Option<String>, use_ssl: bool) -> Self {
        let protocol = if use_ssl { "https" } else { "http" };
        let base_url = format!("{protocol}://{server}/{user_domain}");
        Self {
            api_url: format!("{base_url}/shareflow/api/v{API_VERSION}.json"),
            auth_url: format!("{base_url}/shareflow/api/v{API_VERSION}/auth.json"),
            base_url,
            key,
            query_timeout: QUERY_TIMEOUT,
            content_timeout: CONTENT_TIMEOUT,
        }
    }

    /// Override the per-request timeouts (queries/updates, content and
    /// uploads respectively).
    pub fn with_timeouts(mut self, query: Duration, content: Duration) -> Self {
        self.query_timeout = query;
        self.content_timeout = content;
        self
    }

    /// Exchange credentials for an auth token.
    pub fn get_auth_token(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let body = json!({ "login": username, "password": password });
        let response = self.execute(self.json_post(&self.auth_url, &body, self.query_timeout))?;
        let data = response.json()?;
        data.get("data")
            .and_then(|d| d.get("auth_token"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| ApiError::AuthFailed("response carries no auth token".into()))
    }

    /// Execute a read request and return the decoded JSON response.
    pub fn api_query(&self, query: &Query) -> Result<Value, ApiError> {
        let body = query.body(self.key());
        self.execute(self.json_post(&self.api_url, &body, self.query_timeout))?
            .json()
    }

    /// Execute a write request and return the decoded JSON response.
    pub fn api_update(&self, update: &Update) -> Result<Value, ApiError> {
        let body = update.body(self.key());
        self.execute(self.json_post(&self.api_url, &body, self.query_timeout))?
            .json()
    }

    /// Execute a write request carrying file attachments as one multipart
    /// exchange: a `key` part, one `file_<uuid>` part per file, and a `data`
    /// part whose payload references each file by its generated part name.
    pub fn api_update_with_files(
        &self,
        update: &Update,
        file_paths: &[&Path],
    ) -> Result<Value, ApiError> {
        let boundary = format!("----shareflow-{}", Uuid::new_v4().simple());
        let mut body = MultipartBody::new(&boundary);

        body.text_part("key", "application/json; charset=UTF-8", self.key());

        let mut parts = Vec::with_capacity(file_paths.len());
        for path in file_paths {
            let part_id = format!("file_{}", Uuid::new_v4());
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| part_id.clone());
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            let bytes = std::fs::read(path).map_err(|e| ApiError::FileRead {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            body.file_part(&part_id, &file_name, mime.essence_str(), &bytes);
            parts.push(json!({ "part_id": part_id }));
        }

        let mut update = update.clone();
        update.set("files", Value::Array(parts));
        body.text_part(
            "data",
            "application/json; charset=UTF-8",
            &update.data().to_string(),
        );

        let request = HttpRequest {
            method: HttpMethod::Post,
            url: self.api_url.clone(),
            content_type: Some(format!("multipart/form-data; boundary={boundary}")),
            body: Some(body.finish()),
            timeout: self.content_timeout,
        };
        self.execute(request)?.json()
    }

    /// Fetch raw bytes from a server-relative content path.
    pub fn content_request(&self, path: &str) -> Result<Vec<u8>, ApiError> {
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: self.create_url(path),
            content_type: None,
            body: None,
            timeout: self.content_timeout,
        };
        let response = self.execute(request)?;
        check_status(&response)?;
        Ok(response.body)
    }

    /// Absolute, keyed url for a server-relative content path.
    pub fn create_url(&self, path: &str) -> String {
        format!("{}{}?key={}", self.base_url, path, self.key())
    }

    fn key(&self) -> &str {
        self.key.as_deref().unwrap_or_default()
    }

    fn json_post(&self, url: &str, body: &Value, timeout: Duration) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Post,
            url: url.to_string(),
            content_type: Some("application/json; charset=UTF-8".to_string()),
            body: Some(body.to_string().into_bytes()),
            timeout,
        }
    }

    /// Perform one round trip. The connection lives only for this call.
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(url = %request.url, method = ?request.method, "shareflow request");

        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(request.timeout))
            .build()
            .new_agent();

        let result = match (request.method, request.body) {
            (HttpMethod::Get, _) => agent
                .get(&request.url)
                .header("User-Agent", USER_AGENT)
                .header("Accept", "application/json")
                .call(),
            (HttpMethod::Post, body) => {
                let body = body.unwrap_or_default();
                let mut builder = agent
                    .post(&request.url)
                    .header("User-Agent", USER_AGENT)
                    .header("Accept", "application/json");
                if let Some(content_type) = &request.content_type {
                    builder = builder.header("Content-Type", content_type);
                }
                builder.send(&body[..])
            }
        };

        let mut response = result.map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        debug!(status, bytes = body.len(), "shareflow response");
        Ok(HttpResponse { status, content_type, body })
    }
}

/// Incremental multipart/form-data body writer.
struct MultipartBody {
    boundary: String,
    buf: Vec<u8>,
}

impl MultipartBody {
    fn new(boundary: &str) -> Self {
        Self { boundary: boundary.to_string(), buf: Vec::new() }
    }

    fn text_part(&mut self, name: &str, content_type: &str, value: &str) {
        self.header(&format!("form-data; name=\"{name}\""), content_type);
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }

    fn file_part(&mut self, name: &str, file_name: &str, content_type: &str, bytes: &[u8]) {
        self.header(
            &format!("form-data; name=\"{name}\"; filename=\"{file_name}\""),
            content_type,
        );
        self.buf.extend_from_slice(bytes);
        self.buf.extend_from_slice(b"\r\n");
    }

    fn header(&mut self, disposition: &str, content_type: &str) {
        self.buf
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
        self.buf.extend_from_slice(
            format!("Content-Disposition: {disposition}\r\n").as_bytes(),
        );
        self.buf
            .extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    }

    fn finish(mut self) -> Vec<u8> {
        self.buf
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        self.buf
    }
}
