//! The `/proxy` endpoint.
//!
//! # Pipeline
//!
//! ```text
//! Received → RateChecked → Validated → Forwarded → Responded
//!     │           │            │
//!     └───────────┴────────────┴──→ Error (JSON body)
//! ```
//!
//! Rate checking happens in [`RateLimitLayer`](crate::middleware::RateLimitLayer)
//! before this handler runs. Any path suffix after `/proxy/` is ignored; the
//! target's own path is what goes upstream.

use axum::Extension;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::Response;
use tracing::{debug, info, instrument};

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::middleware::{RequestTimeout, effective_timeout};
use crate::state::AppState;
use crate::validation::{ValidationError, check_private_network, validate};

/// Query parameter carrying the target URL.
const URL_PARAM: &str = "url";

/// Proxy a request to the URL given in the `url` query parameter.
///
/// Method, headers (after rewriting) and body are forwarded; the upstream
/// status, headers (after rewriting) and body are streamed back.
#[instrument(skip_all, fields(method = %method))]
pub async fn proxy_request(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    method: Method,
    headers: HeaderMap,
    timeout: Option<Extension<RequestTimeout>>,
    body: Result<Bytes, BytesRejection>,
) -> AppResult<Response> {
    let result = proxy_inner(&state, query.as_deref(), method, &headers, timeout, body).await;
    metrics::record_proxy_outcome(outcome_label(&result));
    result
}

async fn proxy_inner(
    state: &AppState,
    query: Option<&str>,
    method: Method,
    headers: &HeaderMap,
    timeout: Option<Extension<RequestTimeout>>,
    body: Result<Bytes, BytesRejection>,
) -> AppResult<Response> {
    let raw = target_url_param(query).ok_or(ValidationError::MissingUrl)?;
    let target = validate(&raw)?;

    if state.config.block_private_networks {
        check_private_network(&target)?;
    }

    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge {
                limit: state.config.max_request_body_size,
            }
        } else {
            AppError::BadRequest(rejection.body_text())
        }
    })?;

    let timeout = effective_timeout(timeout.map(|Extension(t)| t), state.forwarder.timeout());
    debug!(
        target = %target.upstream_url(),
        body_bytes = body.len(),
        timeout_ms = timeout.as_millis() as u64,
        "Forwarding request"
    );

    let response = state
        .forwarder
        .forward(&target, method, headers, body, timeout)
        .await?;

    info!(
        upstream = %target.origin,
        status = response.status().as_u16(),
        "Proxied request"
    );
    Ok(response)
}

/// Extract and percent-decode the `url` parameter from a raw query string.
///
/// The first occurrence wins. An empty value counts as missing.
pub fn target_url_param(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == URL_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

fn outcome_label(result: &AppResult<Response>) -> &'static str {
    match result {
        Ok(_) => "forwarded",
        Err(AppError::Validation(ValidationError::BlockedDomain(_))) => "blocked",
        Err(AppError::PayloadTooLarge { .. }) => "too_large",
        Err(AppError::UpstreamFailure(_)) => "upstream_error",
        Err(_) => "bad_request",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_target_url_param_decodes() {
        let value = target_url_param(Some("url=https%3A%2F%2Fexample.com%2Fa%3Fb%3D1"));
        assert_eq!(value.as_deref(), Some("https://example.com/a?b=1"));
    }

    #[test]
    fn test_target_url_param_unencoded_value() {
        let value = target_url_param(Some("url=https://example.com/path"));
        assert_eq!(value.as_deref(), Some("https://example.com/path"));
    }

    #[test]
    fn test_target_url_param_missing() {
        assert_eq!(target_url_param(None), None);
        assert_eq!(target_url_param(Some("other=1")), None);
        assert_eq!(target_url_param(Some("url=")), None);
    }

    #[test]
    fn test_target_url_param_first_wins() {
        let value = target_url_param(Some("url=https://a.example.com&url=https://b.example.com"));
        assert_eq!(value.as_deref(), Some("https://a.example.com"));
    }

    #[test]
    fn test_outcome_labels() {
        let blocked: AppResult<Response> =
            Err(ValidationError::BlockedDomain("localhost".into()).into());
        assert_eq!(outcome_label(&blocked), "blocked");

        let missing: AppResult<Response> = Err(ValidationError::MissingUrl.into());
        assert_eq!(outcome_label(&missing), "bad_request");

        let upstream: AppResult<Response> = Err(AppError::UpstreamFailure("refused".into()));
        assert_eq!(outcome_label(&upstream), "upstream_error");
    }
}
