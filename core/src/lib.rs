//! Synchronous client for the hosted Shareflow collaboration service.
//!
//! # Overview
//! Every operation is one blocking JSON request/response round trip against
//! a single API endpoint: build a [`Query`] or [`Update`], execute it
//! through the [`transport::Requester`], then decode the response into
//! typed entities and resolve cross-references ([`merge`]).
//!
//! # Design
//! - [`Api`] is stateless between calls: no cache, no shared mutable
//!   state. Entities are constructed fresh from each response and handed to
//!   the caller as immutable data.
//! - Request building and response merging are plain-data transformations,
//!   testable without a server; only the `Requester` touches the network.
//! - Responses merge heterogeneous collections: posts resolve their files,
//!   comments and author; flows resolve their members, owner and
//!   invitations. A reference to an id missing from a present side table
//!   fails the merge rather than being silently dropped.

pub mod client;
pub mod entities;
pub mod error;
pub mod http;
pub mod merge;
pub mod query;
pub mod transport;

pub use client::{Api, PostFilter};
pub use entities::{Comment, File, Flow, Invitation, MapContent, Post, PostKind, User};
pub use error::ApiError;
pub use query::{OrderBy, Query, Update, MAX_LIMIT};
pub use transport::Requester;
