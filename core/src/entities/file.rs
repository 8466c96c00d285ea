//! File attachments on posts.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::transport::Requester;

/// A file attached to a post. The server hands back a relative url; the
/// absolute download url and the raw bytes are derived on demand through
/// the transport the file was decoded with; nothing is fetched eagerly or
/// cached.
#[derive(Debug, Clone, Deserialize)]
pub struct File {
    pub id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default, deserialize_with = "super::lenient_i64")]
    pub file_size: i64,
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub is_image: bool,
    #[serde(default, deserialize_with = "super::json_blob")]
    pub meta_data: Option<Value>,
    #[serde(default, deserialize_with = "super::lenient_opt_u32")]
    pub width: Option<u32>,
    #[serde(default, deserialize_with = "super::lenient_opt_u32")]
    pub height: Option<u32>,
    /// Server-relative content path.
    #[serde(default, rename = "url")]
    pub path: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(skip)]
    requester: Option<Requester>,
}

impl File {
    /// Decode a raw record and attach the transport used to reach the
    /// server, so content can be materialized later.
    pub fn decode(requester: &Requester, record: &Value) -> Result<Self, ApiError> {
        let mut file: File =
            serde_json::from_value(record.clone()).map_err(|e| ApiError::decode("file", e))?;
        file.requester = Some(requester.clone());
        Ok(file)
    }

    /// Absolute, keyed download url. `None` when the server supplied no
    /// content path.
    pub fn download_url(&self) -> Option<String> {
        let requester = self.requester.as_ref()?;
        self.path.as_deref().map(|p| requester.create_url(p))
    }

    /// Fetch the raw file bytes. Computed per call; nothing is cached.
    pub fn retrieve(&self) -> Result<Vec<u8>, ApiError> {
        let requester = self
            .requester
            .as_ref()
            .ok_or_else(|| ApiError::Transport("file has no transport attached".into()))?;
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| ApiError::decode("file", "record carries no content url"))?;
        requester.content_request(path)
    }

    /// Value of `attachment_type` in the metadata blob, if any.
    pub fn attachment_type(&self) -> Option<&str> {
        self.meta_data.as_ref()?.get("attachment_type")?.as_str()
    }

    /// Comparator for sorting files by creation time.
    pub fn by_created_at(a: &File, b: &File) -> Ordering {
        a.created_at.cmp(&b.created_at)
    }
}

impl PartialEq for File {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for File {}
