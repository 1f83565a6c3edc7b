//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │   Request ID     │ ← Sets/propagates X-Request-Id
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response spans
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │   Body Limit     │ ← 413 past MAX_REQUEST_BODY_SIZE
//! └────────┬─────────┘
//!          │
//!          ├──────────────────────────┐
//!          ▼                          ▼
//! ┌──────────────────┐       ┌──────────────────┐
//! │  Rate Limiting   │       │      CORS        │ ← /health, /stats only
//! └────────┬─────────┘       └────────┬─────────┘
//!          │                          │
//!          ▼                          ▼
//! ┌──────────────────┐            Handler
//! │ Request Timeout  │ ← X-Request-Timeout
//! └────────┬─────────┘
//!          │
//!          ▼
//!      Handler
//! ```
//!
//! `/proxy` has no CORS layer: every method, `OPTIONS` included, runs the
//! full rate limit, validation and forwarding pipeline. Proxied responses
//! get their CORS headers from the response rewrite.
//!
//! # Routes
//!
//! - `/health`, `/stats` - Monitoring, never rate limited
//! - `/proxy`, `/proxy/{*rest}` - Any method; the suffix is ignored

use axum::Router;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::Request;
use axum::routing::{any, get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span};

use crate::handlers;
use crate::middleware::{RateLimitLayer, extract_request_timeout};
use crate::state::AppState;

/// Header carrying the per-request correlation ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the application router with all routes and middleware configured.
///
/// Rate limiting is attached when `state.rate_limiter` is present, which
/// [`AppState::new`] decides from `RATE_LIMIT_MAX_REQUESTS`.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    // =========================================================================
    // Proxy Routes
    // =========================================================================
    let mut proxy = Router::new()
        .route("/proxy", any(handlers::proxy_request))
        .route("/proxy/{*rest}", any(handlers::proxy_request))
        .route_layer(axum::middleware::from_fn(extract_request_timeout));

    if let Some(limiter) = &state.rate_limiter {
        let layer = RateLimitLayer::new(limiter.clone(), &config.trusted_proxies);
        info!(
            max_requests = limiter.limit(),
            window_secs = limiter.window().as_secs(),
            trusted_proxies_enabled = layer.trusts_proxies(),
            "Rate limiting enabled"
        );
        proxy = proxy.route_layer(layer);
    } else {
        info!("Rate limiting disabled (RATE_LIMIT_MAX_REQUESTS=0)");
    }

    // =========================================================================
    // Apply Middleware Stack (order matters - applied bottom to top)
    // =========================================================================
    info!(
        max_size_mb = config.max_request_body_size / (1024 * 1024),
        block_private_networks = config.block_private_networks,
        "Proxy limits configured"
    );

    // =========================================================================
    // Monitoring Routes
    // =========================================================================
    let monitoring = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::stats))
        .layer(build_cors_layer(&config.cors_allowed_origins));

    monitoring
        .merge(proxy)
        .layer(DefaultBodyLimit::max(config.max_request_body_size))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            // Path only; the query holds the caller's target URL
            info_span!(
                "http_request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = %request_id,
            )
        }))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// Build CORS layer for the monitoring endpoints.
///
/// The layer answers every `OPTIONS` request itself, so it must never wrap
/// the proxy routes.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
