//! HTTP middleware for rate limiting and request shaping.
//!
//! - **Rate Limiting**: Fixed window per client identity (`Origin`, IP, or `"unknown"`)
//! - **Client Identity**: Prioritized lookup with trusted proxy validation
//! - **Request Timeout**: Client-specified upstream timeout, bounded by config
//!
//! # Architecture
//!
//! ```text
//! Request → Request ID → Trace → Body Limit → Rate Limiter → Timeout → proxy handler
//!                                                    ↓             ↓
//!                                          429 Too Many Requests  ext
//! ```
//!
//! The rate limiter and timeout wrap `/proxy` only. `/health` and `/stats`
//! sit behind the CORS layer instead.

pub mod ip;
pub mod rate_limit;
pub mod timeout;

pub use ip::{TrustedProxyConfig, UNKNOWN_CLIENT, client_identity, client_ip};
pub use rate_limit::{
    FixedWindowLimiter, RateLimitError, RateLimitExceeded, RateLimitLayer, RateWindow,
};
pub use timeout::{
    MAX_REQUEST_TIMEOUT_MS, MIN_REQUEST_TIMEOUT_MS, REQUEST_TIMEOUT_HEADER, RequestTimeout,
    effective_timeout, extract_request_timeout,
};
