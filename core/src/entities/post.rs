//! Posts, the polymorphic content items inside a flow.
//!
//! The wire discriminator is `post_type`; decoding dispatches through a
//! fixed tag table into [`PostKind`]. An unrecognized tag degrades to
//! `Plain` with a diagnostic rather than failing the merge.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::{Comment, File, User};
use crate::error::ApiError;

/// Matches the first `http` url inside an `href`-like attribute of embed
/// markup, e.g. `<a href="http://...">`.
static EMBED_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"="(http.*?)""#).expect("embed link pattern"));

/// Structured payload of a map post.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MapContent {
    pub address: String,
    /// Coordinate pair as sent by the server.
    pub point: (f64, f64),
}

/// Variant of a post, decoded from the `post_type` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum PostKind {
    /// Ordinary message post; also the fallback for unknown tags.
    Plain,
    Image,
    Video,
    File,
    Map(MapContent),
    Html,
    Email,
    Event,
}

/// A single item of content within a flow.
///
/// `files`, `comments` and `author` are resolved by the response merger;
/// a freshly decoded post carries only the id sets.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: String,
    pub flow_id: Option<String>,
    pub flow_name: Option<String>,
    /// Raw wire discriminator, kept verbatim.
    pub post_type: Option<String>,
    pub kind: PostKind,
    pub content: Option<String>,
    pub star: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Ids of this post's comments, de-duplicated.
    pub reply_ids: BTreeSet<String>,
    /// Ids of this post's file attachments, de-duplicated.
    pub file_ids: BTreeSet<String>,
    pub user_id: Option<i64>,

    pub files: Vec<File>,
    pub comments: Vec<Comment>,
    pub author: Option<User>,
}

/// Allow-listed wire fields of a post record.
#[derive(Deserialize)]
struct RawPost {
    id: String,
    #[serde(default)]
    flow_id: Option<String>,
    #[serde(default)]
    flow_name: Option<String>,
    #[serde(default)]
    post_type: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    star: bool,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    reply_ids: BTreeSet<String>,
    #[serde(default)]
    file_ids: BTreeSet<String>,
    #[serde(default)]
    user_id: Option<i64>,
}

impl Post {
    pub fn decode(record: &Value) -> Result<Self, ApiError> {
        let raw: RawPost =
            serde_json::from_value(record.clone()).map_err(|e| ApiError::decode("post", e))?;
        let kind = decode_kind(raw.post_type.as_deref(), raw.content.as_deref())?;
        Ok(Post {
            id: raw.id,
            flow_id: raw.flow_id,
            flow_name: raw.flow_name,
            post_type: raw.post_type,
            kind,
            content: raw.content,
            star: raw.star,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            reply_ids: raw.reply_ids,
            file_ids: raw.file_ids,
            user_id: raw.user_id,
            files: Vec::new(),
            comments: Vec::new(),
            author: None,
        })
    }

    /// Comparator for sorting posts by creation time.
    pub fn by_created_at(a: &Post, b: &Post) -> Ordering {
        a.created_at.cmp(&b.created_at)
    }

    pub fn is_map(&self) -> bool {
        matches!(self.kind, PostKind::Map(_))
    }

    pub fn is_image(&self) -> bool {
        self.kind == PostKind::Image
    }

    pub fn is_video(&self) -> bool {
        self.kind == PostKind::Video
    }

    pub fn is_file(&self) -> bool {
        self.kind == PostKind::File
    }

    pub fn is_html(&self) -> bool {
        self.kind == PostKind::Html
    }

    pub fn is_email(&self) -> bool {
        self.kind == PostKind::Email
    }

    pub fn is_event(&self) -> bool {
        self.kind == PostKind::Event
    }

    /// Street address of a map post.
    pub fn address(&self) -> Option<&str> {
        match &self.kind {
            PostKind::Map(map) => Some(&map.address),
            _ => None,
        }
    }

    /// Coordinate pair of a map post.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match &self.kind {
            PostKind::Map(map) => Some(map.point),
            _ => None,
        }
    }

    /// Whether this is an embed-style post (image/video) carrying markup.
    pub fn is_embed(&self) -> bool {
        matches!(self.kind, PostKind::Image | PostKind::Video) && self.content.is_some()
    }

    /// External link extracted from embed markup, if present.
    pub fn external_link(&self) -> Option<&str> {
        if !self.is_embed() {
            return None;
        }
        let content = self.content.as_deref()?;
        EMBED_LINK
            .captures(content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// The attached file carrying the authoritative email message, for an
    /// email post. Found by metadata tag, independent of attachment order.
    pub fn message_file(&self) -> Option<&File> {
        if !self.is_email() {
            return None;
        }
        self.files
            .iter()
            .find(|f| f.attachment_type() == Some("email_message"))
    }

    /// Display name of the email sender, read from the message file's
    /// metadata.
    pub fn sender(&self) -> Option<&str> {
        self.message_meta("sender_display_name")
    }

    /// Subject line of the email message.
    pub fn subject(&self) -> Option<&str> {
        self.message_meta("subject")
    }

    /// Short summary of the email message.
    pub fn summary(&self) -> Option<&str> {
        self.message_meta("summary")
    }

    /// Raw bytes of the email message body, fetched on demand.
    pub fn message_content(&self) -> Result<Vec<u8>, ApiError> {
        self.message_file()
            .ok_or_else(|| {
                ApiError::InvalidArgument("post has no email message attachment".into())
            })?
            .retrieve()
    }

    /// The attached file carrying the calendar payload, for an event post.
    pub fn event_file(&self) -> Option<&File> {
        if !self.is_event() {
            return None;
        }
        self.files
            .iter()
            .find(|f| f.attachment_type() == Some("event"))
    }

    /// Raw ICS bytes of the calendar payload, fetched on demand.
    pub fn ics_content(&self) -> Result<Vec<u8>, ApiError> {
        self.event_file()
            .ok_or_else(|| {
                ApiError::InvalidArgument("post has no event attachment".into())
            })?
            .retrieve()
    }

    fn message_meta(&self, field: &str) -> Option<&str> {
        self.message_file()?.meta_data.as_ref()?.get(field)?.as_str()
    }
}

impl PartialEq for Post {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Post {}

fn decode_kind(tag: Option<&str>, content: Option<&str>) -> Result<PostKind, ApiError> {
    Ok(match tag {
        Some("comment") | None => PostKind::Plain,
        Some("image") => PostKind::Image,
        Some("video") => PostKind::Video,
        Some("file") => PostKind::File,
        Some("html") => PostKind::Html,
        Some("message") => PostKind::Email,
        Some("event") => PostKind::Event,
        Some("map") => {
            let content = content.ok_or_else(|| {
                ApiError::decode("post", "map post carries no content")
            })?;
            let map: MapContent = serde_json::from_str(content)
                .map_err(|e| ApiError::decode("post", format!("invalid map content: {e}")))?;
            PostKind::Map(map)
        }
        Some(unknown) => {
            warn!(post_type = unknown, "unrecognized post type, treating as plain");
            PostKind::Plain
        }
    })
}
