//! Typed Shareflow entities.
//!
//! Every entity decodes from a raw JSON record via serde: unknown server
//! fields are silently dropped (the struct is the allow-list), recognized
//! fields that are absent fall back to the type's default, and a present
//! field with a structurally invalid value fails the decode. Identity is by
//! id; ordering helpers use business fields (creation time, last name),
//! never id order.

mod comment;
mod file;
mod flow;
mod post;
mod user;

pub use comment::Comment;
pub use file::File;
pub use flow::{Flow, Invitation};
pub use post::{MapContent, Post, PostKind};
pub use user::User;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Integer that also accepts a numeric string. Several count fields come
/// back from the server as `"42"` rather than `42`.
pub(crate) fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom("expected an integer")),
        Value::String(s) => s
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid integer '{s}'"))),
        Value::Null => Ok(0),
        other => Err(serde::de::Error::custom(format!(
            "expected integer or numeric string, got {other}"
        ))),
    }
}

/// Optional integer with the same string coercion as [`lenient_i64`].
pub(crate) fn lenient_opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .map(|v| Some(v as u32))
            .ok_or_else(|| serde::de::Error::custom("expected a non-negative integer")),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => s
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid integer '{s}'"))),
        other => Err(serde::de::Error::custom(format!(
            "expected integer or numeric string, got {other}"
        ))),
    }
}

/// Metadata blob: a JSON-encoded string decoded into a structured value.
/// An already-structured object is passed through. Never evaluated as code.
pub(crate) fn json_blob<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => serde_json::from_str(&s)
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid metadata JSON: {e}"))),
        structured => Ok(Some(structured)),
    }
}
