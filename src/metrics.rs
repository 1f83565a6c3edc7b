//! Prometheus metrics for proxy observability.
//!
//! Metrics are exposed on a dedicated listener (`METRICS_PORT`, default 9090),
//! separate from the proxy port.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `proxy_requests_total` - Proxy requests by outcome (`forwarded`,
//!   `bad_request`, `blocked`, `too_large`, `upstream_error`)
//! - `proxy_rate_limited_total` - Requests rejected by the rate limiter
//!
//! ## Histograms
//! - `proxy_upstream_duration_seconds` - Time to upstream response headers
//!   (label `status`: HTTP status or `error`)
//!
//! ## Gauges
//! - `proxy_rate_limit_tracked_clients` - Client identities in the rate table
//!
//! # Usage
//!
//! ```rust,ignore
//! use integrated_server_proxy::metrics::{init_metrics, record_proxy_outcome};
//!
//! init_metrics("0.0.0.0:9090".parse()?)?;
//! record_proxy_outcome("forwarded");
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "proxy_requests_total";
    pub const RATE_LIMITED_TOTAL: &str = "proxy_rate_limited_total";
    pub const UPSTREAM_DURATION_SECONDS: &str = "proxy_upstream_duration_seconds";
    pub const TRACKED_CLIENTS: &str = "proxy_rate_limit_tracked_clients";
}

/// Install the Prometheus exporter and describe all metrics.
///
/// # Errors
///
/// Returns a message if the exporter cannot be installed (port in use, or a
/// recorder was already installed).
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::REQUESTS_TOTAL,
        "Total proxy requests, labelled by outcome"
    );
    describe_counter!(
        names::RATE_LIMITED_TOTAL,
        "Total requests rejected by the rate limiter"
    );
    describe_histogram!(
        names::UPSTREAM_DURATION_SECONDS,
        "Upstream response time in seconds"
    );
    describe_gauge!(
        names::TRACKED_CLIENTS,
        "Client identities currently tracked by the rate limiter"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record the outcome of one proxy request.
pub fn record_proxy_outcome(outcome: &'static str) {
    counter!(names::REQUESTS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a rate limiter rejection.
pub fn record_rate_limited() {
    counter!(names::RATE_LIMITED_TOTAL).increment(1);
}

/// Record upstream response time.
pub fn record_upstream_duration(status: &str, duration_secs: f64) {
    histogram!(names::UPSTREAM_DURATION_SECONDS, "status" => status.to_string())
        .record(duration_secs);
}

/// Update the tracked clients gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_tracked_clients(count: usize) {
    gauge!(names::TRACKED_CLIENTS).set(count as f64);
}
