//! Client-requested upstream timeouts.
//!
//! Callers may ask the proxy to give up on the upstream sooner than the
//! configured default by sending `X-Request-Timeout` in milliseconds:
//!
//! ```text
//! X-Request-Timeout: 5000
//! ```
//!
//! The value is bounded to [`MIN_REQUEST_TIMEOUT_MS`]..=[`MAX_REQUEST_TIMEOUT_MS`]
//! and can only shorten the configured upstream timeout, never extend it.
//! Invalid or out-of-range values are ignored. The header itself is consumed
//! by the proxy and not forwarded upstream.

use std::time::Duration;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

/// Minimum accepted timeout (100ms).
pub const MIN_REQUEST_TIMEOUT_MS: u64 = 100;

/// Maximum accepted timeout (5 minutes).
pub const MAX_REQUEST_TIMEOUT_MS: u64 = 300_000;

/// Header carrying the client-requested timeout.
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout";

/// Timeout requested by the caller, stored in request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeout {
    pub duration: Duration,
}

impl RequestTimeout {
    /// Returns `None` if `ms` is outside the accepted range.
    pub fn from_millis(ms: u64) -> Option<Self> {
        (MIN_REQUEST_TIMEOUT_MS..=MAX_REQUEST_TIMEOUT_MS)
            .contains(&ms)
            .then(|| Self {
                duration: Duration::from_millis(ms),
            })
    }

    /// Parse a raw header value.
    pub fn from_header(value: &str) -> Option<Self> {
        value.trim().parse::<u64>().ok().and_then(Self::from_millis)
    }

    /// The shorter of the requested timeout and `configured`.
    pub fn effective(&self, configured: Duration) -> Duration {
        self.duration.min(configured)
    }
}

/// Resolve the timeout for one upstream call.
pub fn effective_timeout(requested: Option<RequestTimeout>, configured: Duration) -> Duration {
    requested.map_or(configured, |t| t.effective(configured))
}

/// Middleware that parses `X-Request-Timeout` into a [`RequestTimeout`] extension.
pub async fn extract_request_timeout(mut request: Request, next: Next) -> Response {
    if let Some(value) = request.headers().get(REQUEST_TIMEOUT_HEADER)
        && let Ok(value) = value.to_str()
    {
        match RequestTimeout::from_header(value) {
            Some(timeout) => {
                debug!(
                    timeout_ms = timeout.duration.as_millis() as u64,
                    "Client requested upstream timeout"
                );
                request.extensions_mut().insert(timeout);
            }
            None => {
                debug!(
                    value,
                    min = MIN_REQUEST_TIMEOUT_MS,
                    max = MAX_REQUEST_TIMEOUT_MS,
                    "Ignoring invalid X-Request-Timeout"
                );
            }
        }
    }

    next.run(request).await
}
