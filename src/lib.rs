//! # integrated-server-proxy
//!
//! An outbound HTTP/HTTPS forwarding proxy built on Axum. Callers send any
//! request to `/proxy?url=<absolute-url>`; the proxy validates the target,
//! applies a per-client fixed-window rate limit, forwards the request with
//! credentials stripped, and streams the upstream response back with
//! permissive CORS headers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Request ID → Trace → Rate Limit → Timeout)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, stats, proxy)                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Validation (blacklist + private network check)             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Forwarder (reqwest, header rewriting, no redirects)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use integrated_server_proxy::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config)?;
//!     let app = build_router(state.clone());
//!
//!     // Serve with `into_make_service_with_connect_info::<SocketAddr>()`...
//!     state.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! Tighten the rate limit:
//! ```bash
//! RATE_LIMIT_MAX_REQUESTS=20 RATE_LIMIT_WINDOW_SECS=60 cargo run
//! ```
//!
//! Honor `X-Forwarded-For` from a load balancer:
//! ```bash
//! TRUSTED_PROXIES=10.0.0.0/8 cargo run
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod net;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use middleware::FixedWindowLimiter;
pub use routes::build_router;
pub use services::Forwarder;
pub use state::AppState;
pub use validation::{ProxyTarget, ValidationError, validate};
