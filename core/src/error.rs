//! Error types for the Shareflow API client.
//!
//! # Design
//! One flat enum covering the three failure families: caller-input errors
//! (detected before any request is sent), transport/server errors (mapped
//! from the HTTP status), and decode/merge errors. Callers usually match on
//! `InvalidArgument`/`InvalidRequest` vs everything else, so those get
//! dedicated variants rather than a shared "bad input" bucket.

use thiserror::Error;

/// Errors returned by the Shareflow client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A caller-supplied argument is invalid (bad ordering keyword, empty
    /// file list, content and files both absent).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The request is malformed as a whole (mutually exclusive pagination
    /// options, or the server answered 400).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The server answered 403: the resource exists but is not accessible
    /// with the current key.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The server answered 500.
    #[error("service error: {0}")]
    ServiceError(String),

    /// The server answered a status outside the mapped set (400/403/500).
    #[error("unexpected HTTP status {status}: {message}")]
    Status { status: u16, message: String },

    /// The request could not be executed at all (connection refused, DNS,
    /// timeout, I/O while reading the body).
    #[error("transport error: {0}")]
    Transport(String),

    /// The login exchange did not yield an auth token.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// A response record could not be decoded into the expected entity.
    #[error("decode error in {entity}: {message}")]
    Decode { entity: &'static str, message: String },

    /// During merging, an entity referenced an id missing from the
    /// response's side table for that collection.
    #[error("dangling reference: {collection} has no record with id {id}")]
    DanglingReference { collection: &'static str, id: String },

    /// A builder field was read before it was set.
    #[error("field not set: {0}")]
    FieldNotSet(String),

    /// A local file scheduled for upload could not be read.
    #[error("cannot read {path}: {message}")]
    FileRead { path: String, message: String },
}

impl ApiError {
    pub(crate) fn decode(entity: &'static str, err: impl std::fmt::Display) -> Self {
        ApiError::Decode { entity, message: err.to_string() }
    }
}
