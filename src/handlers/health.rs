//! Health and statistics endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Liveness check, always 200 while the process serves
//! - `GET /stats` - Rate limiter and forwarding counters
//!
//! Neither endpoint is rate limited.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::instrument;

use crate::models::{HealthResponse, StatsResponse};
use crate::services::PROXY_IDENTIFIER;
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "timestamp": "2024-01-15T10:30:00Z",
///   "service": "integrated-server-proxy",
///   "version": "0.1.0"
/// }
/// ```
#[instrument]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        service: PROXY_IDENTIFIER,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Statistics endpoint.
///
/// `rate_limit_max_requests` is 0 and `tracked_clients` stays 0 when rate
/// limiting is disabled.
#[instrument(skip(state))]
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let tracked_clients = state
        .rate_limiter
        .as_ref()
        .map_or(0, |limiter| limiter.tracked_clients());

    Json(StatsResponse {
        tracked_clients,
        rate_limit_max_requests: state.config.rate_limit_max_requests,
        rate_limit_window_secs: state.config.rate_limit_window.as_secs(),
        requests_forwarded: state.forwarder.forwarded_count(),
        upstream_failures: state.forwarder.failed_count(),
        uptime_seconds: state.uptime_seconds(),
    })
}
