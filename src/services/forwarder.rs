use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method};
use axum::response::Response;
use reqwest::redirect::Policy;
use tracing::{debug, instrument};

use super::headers::{PROXY_USER_AGENT, rewrite_inbound_headers, rewrite_outbound_headers};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::validation::ProxyTarget;

/// Forwards validated requests to their upstream and relays the response.
///
/// One attempt per request; failures surface immediately as
/// [`AppError::UpstreamFailure`]. Redirects are relayed to the caller rather
/// than followed, so a `3xx` cannot point the proxy at a blocked host.
///
/// # Cancellation
///
/// The upstream request lives inside the handler future and the response
/// body stream. If the caller disconnects, hyper drops both and the
/// in-flight upstream request is aborted with them.
///
/// # Counter Memory Ordering
///
/// `forwarded` and `failed` are `Relaxed` monotonic counters used only for
/// the `/stats` endpoint.
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    timeout: Duration,
    forwarded: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl Forwarder {
    /// Client builder with the proxy's upstream policy applied.
    ///
    /// Exposed so callers can layer extra settings (for example DNS
    /// overrides) on top before building.
    pub fn client_builder(config: &Config) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(config.upstream_connect_timeout)
            .user_agent(PROXY_USER_AGENT)
    }

    /// Create a forwarder from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the HTTP client cannot be built
    /// (e.g., TLS backend initialization failure).
    pub fn new(config: &Config) -> AppResult<Self> {
        let client = Self::client_builder(config)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(client, config.upstream_timeout))
    }

    /// Create a forwarder around an existing client.
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            forwarded: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Configured upstream timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Upstream responses relayed so far.
    pub fn forwarded_count(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Upstream failures so far.
    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Send the caller's request to `target` and relay the upstream response.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UpstreamFailure`] when the upstream cannot be
    /// reached or does not answer within `timeout`.
    #[instrument(
        skip(self, headers, body),
        fields(upstream = %target.origin, path = %target.path_and_query)
    )]
    pub async fn forward(
        &self,
        target: &ProxyTarget,
        method: Method,
        headers: &HeaderMap,
        body: Bytes,
        timeout: Duration,
    ) -> AppResult<Response> {
        let mut request = self
            .client
            .request(method, target.upstream_url())
            .headers(rewrite_outbound_headers(headers))
            .timeout(timeout);

        if !body.is_empty() {
            request = request.body(body);
        }

        let started = Instant::now();
        let upstream = match request.send().await {
            Ok(upstream) => upstream,
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                metrics::record_upstream_duration("error", started.elapsed().as_secs_f64());
                return Err(map_upstream_error(&e));
            }
        };

        let status = upstream.status();
        metrics::record_upstream_duration(status.as_str(), started.elapsed().as_secs_f64());
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        debug!(
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Upstream responded"
        );

        let mut response_headers = upstream.headers().clone();
        rewrite_inbound_headers(&mut response_headers, target);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;

        Ok(response)
    }
}

/// Convert a client error into an upstream failure carrying the full cause chain.
pub fn map_upstream_error(err: &reqwest::Error) -> AppError {
    let mut detail = err.to_string();

    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        let text = cause.to_string();
        if !detail.contains(&text) {
            detail.push_str(": ");
            detail.push_str(&text);
        }
        source = cause.source();
    }

    if err.is_timeout() && !detail.contains("timed out") {
        detail.push_str(" (timed out)");
    }

    AppError::UpstreamFailure(detail)
}
