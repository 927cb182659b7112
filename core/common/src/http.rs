//! Shared HTTP response handling for the Google REST facades.
//!
//! Every facade funnels provider responses through these helpers so that
//! HTTP-level failures map onto the same error variants everywhere: 401 is an
//! authentication failure, 403 a permission failure, 404 a missing resource,
//! and anything else surfaces the provider's own message.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Characters escaped when an identifier is embedded as a URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'%');

/// Percent-encode an identifier for use as a single URL path segment.
pub fn encode_path_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// Decode a JSON response body, mapping failures onto the common error type.
pub async fn decode_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let response = expect_success(response).await?;
    response
        .json()
        .await
        .map_err(|e| Error::Network(format!("Failed to parse response: {}", e)))
}

/// Check the response status, returning the response untouched on success.
pub async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(api_error(status, &body))
}

/// Map a non-success status and body onto a typed error.
pub fn api_error(status: StatusCode, body: &str) -> Error {
    let message = provider_message(body);
    match status {
        StatusCode::UNAUTHORIZED => Error::Authentication(message),
        StatusCode::FORBIDDEN => Error::PermissionDenied(message),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        _ => Error::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Extract the provider's human-readable message from an error body.
///
/// Google error bodies carry `{"error": {"message": ...}}`; anything else is
/// passed through truncated.
fn provider_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(500).collect())
}
