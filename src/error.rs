use axum::http::StatusCode;
use axum::http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::middleware::RateLimitExceeded;
use crate::validation::ValidationError;

/// Application-wide error types with appropriate HTTP status codes.
///
/// Every variant renders as a JSON body with a stable `error` tag (the HTTP
/// reason phrase) and a human-readable `message`:
///
/// | Variant | Status |
/// |---|---|
/// | `Validation(MissingUrl \| MalformedUrl \| UnsupportedScheme)` | 400 |
/// | `Validation(BlockedDomain)` | 403 |
/// | `PayloadTooLarge` | 413 |
/// | `RateLimited` | 429 |
/// | `UpstreamFailure` | 502 |
/// | `ConfigError` | 500 |
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    #[error("Upstream request failed: {0}")]
    UpstreamFailure(String),

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Error response body for API endpoints.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl AppError {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(ValidationError::BlockedDomain(_)) => StatusCode::FORBIDDEN,
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Log the full error server-side; client errors are expected traffic
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let error = status.canonical_reason().unwrap_or("Error");

        let body = match &self {
            AppError::Validation(e) => ErrorResponse {
                error,
                message: e.to_string(),
                details: None,
                retry_after: None,
            },
            AppError::RateLimited(e) => ErrorResponse {
                error,
                message: e.to_string(),
                details: None,
                retry_after: Some(e.retry_after_secs),
            },
            AppError::UpstreamFailure(detail) => ErrorResponse {
                error,
                message: "Failed to proxy request".to_string(),
                details: Some(detail.clone()),
                retry_after: None,
            },
            AppError::PayloadTooLarge { .. } | AppError::BadRequest(_) => ErrorResponse {
                error,
                message: self.to_string(),
                details: None,
                retry_after: None,
            },
            // Never expose internal details to clients
            AppError::ConfigError(_) => ErrorResponse {
                error,
                message: "An internal error occurred. Please contact support if the issue persists."
                    .to_string(),
                details: None,
                retry_after: None,
            },
        };

        let mut response = (status, axum::Json(body)).into_response();

        if let AppError::RateLimited(e) = &self {
            let headers = response.headers_mut();
            headers.insert(RETRY_AFTER, HeaderValue::from(e.retry_after_secs));
            headers.insert(
                HeaderName::from_static("x-ratelimit-limit"),
                HeaderValue::from(e.limit),
            );
            headers.insert(
                HeaderName::from_static("x-ratelimit-remaining"),
                HeaderValue::from_static("0"),
            );
        }

        response
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn render(err: AppError) -> (StatusCode, axum::http::HeaderMap, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_missing_url_is_bad_request() {
        let (status, _, body) = render(ValidationError::MissingUrl.into()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Bad Request");
        assert_eq!(
            body["message"],
            "Missing \"url\" query parameter. Usage: /proxy?url=<target-url>"
        );
    }

    #[tokio::test]
    async fn test_unsupported_scheme_is_bad_request() {
        let (status, _, body) =
            render(ValidationError::UnsupportedScheme("ftp".into()).into()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Only HTTP and HTTPS protocols are supported");
    }

    #[tokio::test]
    async fn test_malformed_url_is_bad_request() {
        let (status, _, body) =
            render(ValidationError::MalformedUrl(url::ParseError::EmptyHost).into()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid URL provided");
    }

    #[tokio::test]
    async fn test_blocked_domain_is_forbidden() {
        let (status, _, body) =
            render(ValidationError::BlockedDomain("localhost".into()).into()).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Forbidden");
        assert_eq!(
            body["message"],
            "Cannot proxy requests to internal/private URLs"
        );
    }

    #[tokio::test]
    async fn test_rate_limited_body_and_headers() {
        let err = RateLimitExceeded {
            retry_after_secs: 42,
            limit: 100,
            window: Duration::from_secs(3600),
        };
        let (status, headers, body) = render(err.into()).await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "Too Many Requests");
        assert_eq!(
            body["message"],
            "Rate limit exceeded. Max 100 requests per hour."
        );
        assert_eq!(body["retryAfter"], 42);
        assert_eq!(headers.get(RETRY_AFTER).unwrap(), "42");
        assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "100");
    }

    #[tokio::test]
    async fn test_upstream_failure_is_bad_gateway_with_details() {
        let (status, _, body) =
            render(AppError::UpstreamFailure("connection refused".into())).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Bad Gateway");
        assert_eq!(body["message"], "Failed to proxy request");
        assert_eq!(body["details"], "connection refused");
        assert!(body.get("retryAfter").is_none());
    }

    #[tokio::test]
    async fn test_config_error_hides_details() {
        let (status, _, body) = render(AppError::ConfigError("secret path".into())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body["message"].as_str().unwrap().contains("secret"));
        assert!(body.get("details").is_none());
    }
}
