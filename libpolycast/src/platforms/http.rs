//! HTTP plumbing shared by the REST adapters
//!
//! Each adapter owns its own [`reqwest::Client`] built here with the
//! per-platform timeout. Responses are funnelled through [`check_status`] so
//! that every adapter maps HTTP failures onto [`PlatformError`] the same way.

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{PlatformError, Result};
use crate::types::Platform;

const BODY_EXCERPT_CHARS: usize = 300;

/// Constructor for the operation-specific error used when a response is a
/// non-auth, non-rate-limit failure
pub type ErrorKind = fn(String) -> PlatformError;

pub fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("polycast/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PlatformError::Network(format!("failed to build HTTP client: {}", e)).into())
}

/// Map a transport-level failure (no HTTP response)
pub fn map_transport_error(platform: Platform, context: &str, error: reqwest::Error) -> PlatformError {
    if error.is_timeout() {
        PlatformError::Network(format!(
            "{} request timed out during {}",
            platform.display_name(),
            context
        ))
    } else {
        PlatformError::Network(format!(
            "{} request failed during {}: {}",
            platform.display_name(),
            context,
            error
        ))
    }
}

/// Map a non-success HTTP status
pub fn map_status_error(
    platform: Platform,
    context: &str,
    status: StatusCode,
    body: &str,
    kind: ErrorKind,
) -> PlatformError {
    let excerpt: String = body.chars().take(BODY_EXCERPT_CHARS).collect();
    let name = platform.display_name();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Authentication(format!(
            "{} rejected credentials during {} (HTTP {}): {}. Reconnect the account.",
            name,
            context,
            status.as_u16(),
            excerpt
        )),
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimit(format!(
            "{} rate limit hit during {}: {}",
            name, context, excerpt
        )),
        _ => kind(format!(
            "{} {} failed (HTTP {}): {}",
            name,
            context,
            status.as_u16(),
            excerpt
        )),
    }
}

/// Pass successful responses through, map everything else
pub async fn check_status(
    platform: Platform,
    context: &str,
    response: Response,
    kind: ErrorKind,
) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(map_status_error(platform, context, status, &body, kind).into())
}

/// Check the status and decode a JSON body
pub async fn read_json<T: DeserializeOwned>(
    platform: Platform,
    context: &str,
    response: Response,
    kind: ErrorKind,
) -> Result<T> {
    let response = check_status(platform, context, response, kind).await?;
    let body = response
        .text()
        .await
        .map_err(|e| map_transport_error(platform, context, e))?;

    serde_json::from_str(&body).map_err(|e| {
        kind(format!(
            "{} {} returned an unexpected response: {}",
            platform.display_name(),
            context,
            e
        ))
        .into()
    })
}

/// Send a prepared request, mapping transport failures
pub async fn send(
    platform: Platform,
    context: &str,
    request: reqwest::RequestBuilder,
) -> Result<Response> {
    request
        .send()
        .await
        .map_err(|e| map_transport_error(platform, context, e).into())
}

/// Join a configurable base URL and a path
pub fn endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_auth() {
        let err = map_status_error(
            Platform::X,
            "create tweet",
            StatusCode::UNAUTHORIZED,
            "{\"title\":\"Unauthorized\"}",
            PlatformError::Publish,
        );
        match err {
            PlatformError::Authentication(msg) => {
                assert!(msg.contains("X rejected credentials during create tweet"));
                assert!(msg.contains("401"));
            }
            other => panic!("Expected Authentication, got {:?}", other),
        }
    }

    #[test]
    fn test_status_mapping_rate_limit() {
        let err = map_status_error(
            Platform::TikTok,
            "publish",
            StatusCode::TOO_MANY_REQUESTS,
            "",
            PlatformError::Publish,
        );
        assert!(matches!(err, PlatformError::RateLimit(_)));
    }

    #[test]
    fn test_status_mapping_uses_operation_kind() {
        let err = map_status_error(
            Platform::Instagram,
            "media upload",
            StatusCode::BAD_REQUEST,
            &"x".repeat(1000),
            PlatformError::Upload,
        );
        match err {
            PlatformError::Upload(msg) => {
                assert!(msg.starts_with("Instagram media upload failed (HTTP 400)"));
                assert!(msg.len() < 400);
            }
            other => panic!("Expected Upload, got {:?}", other),
        }
    }

    #[test]
    fn test_endpoint_joins_cleanly() {
        assert_eq!(
            endpoint("https://api.example.com/", "/v2/tweets"),
            "https://api.example.com/v2/tweets"
        );
        assert_eq!(
            endpoint("http://127.0.0.1:1234", "v2/tweets"),
            "http://127.0.0.1:1234/v2/tweets"
        );
    }
}
