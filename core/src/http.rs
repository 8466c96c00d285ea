//! HTTP request/response described as plain data.
//!
//! # Design
//! The builders produce `HttpRequest` values and the parsing/merging layer
//! consumes `HttpResponse` values; only [`crate::transport::Requester`]
//! touches the network in between. Keeping the boundary as plain data makes
//! the request shapes and the status-mapping rules testable without a
//! server.

use std::time::Duration;

use crate::error::ApiError;

/// HTTP method for a request. The Shareflow API itself is POST-only; GET is
/// used for raw content downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Content-Type of `body`, when a body is present.
    pub content_type: Option<String>,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

/// An HTTP response described as plain data.
///
/// The transport decompresses gzip bodies before constructing this, so
/// `body` is always the plain payload.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Value of the Content-Type header, empty if absent.
    pub content_type: String,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_json(&self) -> bool {
        self.content_type.contains("application/json")
    }

    /// Decode the body as a JSON value, after status checking.
    pub fn json(&self) -> Result<serde_json::Value, ApiError> {
        check_status(self)?;
        serde_json::from_slice(&self.body).map_err(|e| ApiError::decode("response", e))
    }
}

/// Map non-2xx statuses onto the error taxonomy.
///
/// 400, 403 and 500 get dedicated variants; anything else non-2xx lands in
/// `Status`. The server's JSON `message` field is preferred over a generic
/// description when the error body is JSON.
pub fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if (200..300).contains(&response.status) {
        return Ok(());
    }

    let message = server_message(response)
        .unwrap_or_else(|| format!("HTTP {}", response.status));

    Err(match response.status {
        400 => ApiError::InvalidRequest(message),
        403 => ApiError::Forbidden(message),
        500 => ApiError::ServiceError(message),
        status => ApiError::Status { status, message },
    })
}

fn server_message(response: &HttpResponse) -> Option<String> {
    if !response.is_json() {
        return None;
    }
    let value: serde_json::Value = serde_json::from_slice(&response.body).ok()?;
    value.get("message")?.as_str().map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, content_type: &str, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            content_type: content_type.to_string(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn ok_status_passes() {
        assert!(check_status(&response(200, "application/json", "{}")).is_ok());
        assert!(check_status(&response(204, "", "")).is_ok());
    }

    #[test]
    fn bad_request_maps_to_invalid_request_with_server_message() {
        let err = check_status(&response(
            400,
            "application/json; charset=UTF-8",
            r#"{"message": "unknown field"}"#,
        ))
        .unwrap_err();
        match err {
            ApiError::InvalidRequest(msg) => assert_eq!(msg, "unknown field"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn forbidden_maps_to_forbidden() {
        let err = check_status(&response(403, "text/html", "<html>")).unwrap_err();
        match err {
            ApiError::Forbidden(msg) => assert_eq!(msg, "HTTP 403"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn server_error_maps_to_service_error() {
        let err = check_status(&response(
            500,
            "application/json",
            r#"{"message": "boom"}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, ApiError::ServiceError(msg) if msg == "boom"));
    }

    #[test]
    fn unmapped_status_keeps_the_code() {
        let err = check_status(&response(418, "", "")).unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 418, .. }));
    }

    #[test]
    fn non_json_error_body_is_ignored_for_message() {
        let err = check_status(&response(400, "text/plain", "nope")).unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(msg) if msg == "HTTP 400"));
    }

    #[test]
    fn json_accessor_checks_status_first() {
        let err = response(500, "application/json", r#"{"message":"x"}"#)
            .json()
            .unwrap_err();
        assert!(matches!(err, ApiError::ServiceError(_)));
    }
}
