//! Fixed-window rate limiting keyed by client identity.
//!
//! # Algorithm
//!
//! Each client identity owns a [`RateWindow`] `{ count, reset_at }`:
//!
//! - First request, or a request at/after `reset_at`: the window restarts
//!   with `count = 1` and `reset_at = now + window`. Allowed.
//! - Otherwise `count` is incremented. Allowed while `count <= limit`,
//!   rejected once it exceeds the limit.
//!
//! The counter keeps climbing on rejected requests; it is never capped and
//! never refills before the window boundary. This is a plain fixed window,
//! not a token bucket.
//!
//! # Memory
//!
//! Windows live in a sharded [`DashMap`]. A background sweeper removes
//! expired windows every `sweep_interval`, so memory tracks the number of
//! distinct active identities rather than total requests. Nothing is
//! persisted; a restart clears all counters.
//!
//! # Response Headers
//!
//! On rate limit exceeded (429):
//! - `Retry-After`: Seconds until the window resets
//! - `X-RateLimit-Limit`: Configured requests per window
//! - `X-RateLimit-Remaining`: Always `0`

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::{Layer, Service};
use tracing::{debug, info, warn};

use super::ip::{TrustedProxyConfig, client_identity};
use crate::error::AppError;
use crate::metrics;

/// Error type for rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    /// Limit cannot be zero; leave the layer off to disable limiting.
    ZeroLimit,
    /// Window length cannot be zero.
    ZeroWindow,
}

impl fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitError::ZeroLimit => write!(
                f,
                "request limit must be greater than 0; omit the layer for no limiting"
            ),
            RateLimitError::ZeroWindow => write!(f, "window length must be greater than 0"),
        }
    }
}

impl std::error::Error for RateLimitError {}

/// A request was rejected because its identity exhausted the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Rate limit exceeded. Max {limit} requests per {}.", describe_window(.window))]
pub struct RateLimitExceeded {
    /// Whole seconds until the window resets, rounded up.
    pub retry_after_secs: u64,
    /// Configured requests per window.
    pub limit: u32,
    /// Configured window length.
    pub window: Duration,
}

fn describe_window(window: &Duration) -> String {
    match window.as_secs() {
        3600 => "hour".to_string(),
        60 => "minute".to_string(),
        86_400 => "day".to_string(),
        1 => "second".to_string(),
        secs if secs % 3600 == 0 => format!("{} hours", secs / 3600),
        secs if secs % 60 == 0 => format!("{} minutes", secs / 60),
        secs => format!("{secs} seconds"),
    }
}

/// Per-identity request counter for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub count: u64,
    pub reset_at: Instant,
}

impl RateWindow {
    fn start(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            reset_at: now.checked_add(window).unwrap_or(now),
        }
    }
}

/// Process-wide fixed-window rate limiter.
///
/// # Lifecycle
///
/// The limiter works without the sweeper; expired windows are then only
/// replaced lazily on the owning identity's next request. Call
/// [`start_sweeper`](Self::start_sweeper) to bound memory and
/// [`stop`](Self::stop) before exit.
///
/// ```rust,ignore
/// let limiter = Arc::new(FixedWindowLimiter::new(100, Duration::from_secs(3600))?);
/// limiter.start_sweeper();
/// limiter.check("https://app.example.com")?;
/// limiter.stop().await;
/// ```
#[derive(Debug)]
pub struct FixedWindowLimiter {
    windows: DashMap<String, RateWindow>,
    limit: u32,
    window: Duration,
    sweep_interval: Duration,
    sweeper_started: AtomicBool,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl FixedWindowLimiter {
    /// Create a limiter allowing `limit` requests per `window` per identity.
    ///
    /// The sweep interval defaults to the window length.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError`] if `limit` or `window` is zero.
    pub fn new(limit: u32, window: Duration) -> Result<Self, RateLimitError> {
        if limit == 0 {
            return Err(RateLimitError::ZeroLimit);
        }
        if window.is_zero() {
            return Err(RateLimitError::ZeroWindow);
        }

        Ok(Self {
            windows: DashMap::new(),
            limit,
            window,
            sweep_interval: window,
            sweeper_started: AtomicBool::new(false),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Override how often expired windows are swept. Zero is ignored.
    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        if !sweep_interval.is_zero() {
            self.sweep_interval = sweep_interval;
        }
        self
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a request for `client_id` at the current instant.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitExceeded`] when the identity is over its limit.
    pub fn check(&self, client_id: &str) -> Result<(), RateLimitExceeded> {
        self.check_at(client_id, Instant::now())
    }

    /// Record a request for `client_id` at `now`.
    ///
    /// The read-modify-write happens under the key's shard lock, so
    /// concurrent requests for one identity are counted exactly once each.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitExceeded`] when the identity is over its limit.
    pub fn check_at(&self, client_id: &str, now: Instant) -> Result<(), RateLimitExceeded> {
        // Fast path avoids allocating the key for known identities
        if let Some(mut window) = self.windows.get_mut(client_id) {
            return self.advance(&mut window, now);
        }

        match self.windows.entry(client_id.to_owned()) {
            Entry::Occupied(mut occupied) => self.advance(occupied.get_mut(), now),
            Entry::Vacant(vacant) => {
                vacant.insert(RateWindow::start(now, self.window));
                Ok(())
            }
        }
    }

    fn advance(&self, window: &mut RateWindow, now: Instant) -> Result<(), RateLimitExceeded> {
        if now >= window.reset_at {
            *window = RateWindow::start(now, self.window);
            return Ok(());
        }

        window.count = window.count.saturating_add(1);
        if window.count <= u64::from(self.limit) {
            return Ok(());
        }

        Err(RateLimitExceeded {
            retry_after_secs: retry_after_secs(window.reset_at.saturating_duration_since(now)),
            limit: self.limit,
            window: self.window,
        })
    }

    /// Current window for an identity, if one is tracked.
    pub fn window_for(&self, client_id: &str) -> Option<RateWindow> {
        self.windows.get(client_id).map(|w| *w)
    }

    /// Number of identities with a tracked window.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    /// Remove every window whose reset time is at or before `now`.
    ///
    /// Returns the number of windows removed.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| window.reset_at > now);
        before.saturating_sub(self.windows.len())
    }

    /// Spawn the periodic sweeper. Subsequent calls are no-ops.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_sweeper(self: &Arc<Self>) {
        if self.sweeper_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let limiter: Weak<Self> = Arc::downgrade(self);
        let period = self.sweep_interval;
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Rate limit sweeper received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(limiter) = limiter.upgrade() else {
                            break;
                        };
                        let removed = limiter.sweep_expired(Instant::now());
                        let remaining = limiter.tracked_clients();
                        metrics::set_tracked_clients(remaining);
                        debug!(removed, remaining, "Swept expired rate limit windows");
                    }
                }
            }

            debug!("Rate limit sweeper shutting down");
        });

        info!(interval_secs = period.as_secs(), "Rate limit sweeper started");
    }

    /// Stop the sweeper and wait for it to finish.
    pub async fn stop(&self) {
        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
    }
}

/// Round a remaining duration up to whole seconds.
fn retry_after_secs(remaining: Duration) -> u64 {
    u64::try_from(remaining.as_millis().div_ceil(1000)).unwrap_or(u64::MAX)
}

/// Rate limiting layer for Tower middleware stack.
///
/// Applied to the proxy routes only, so health checks never consume budget.
///
/// # Example
///
/// ```rust,ignore
/// let layer = RateLimitLayer::new(limiter, &config.trusted_proxies);
/// let app = Router::new()
///     .route("/proxy", any(handler))
///     .route_layer(layer);
/// ```
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<FixedWindowLimiter>,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<FixedWindowLimiter>, trusted_proxies: &[String]) -> Self {
        Self {
            limiter,
            trusted_proxies: Arc::new(TrustedProxyConfig::new(trusted_proxies)),
        }
    }

    /// Whether forwarding headers are honored from any peer.
    pub fn trusts_proxies(&self) -> bool {
        self.trusted_proxies.is_enabled()
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            trusted_proxies: self.trusted_proxies.clone(),
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<FixedWindowLimiter>,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let identity = client_identity(&req, &self.trusted_proxies);
        let verdict = self.limiter.check(&identity);

        // Swap in a fresh clone so the instance polled ready is the one called
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match verdict {
                Ok(()) => inner.call(req).await,
                Err(exceeded) => {
                    warn!(
                        client = %identity,
                        path = %req.uri().path(),
                        retry_after_secs = exceeded.retry_after_secs,
                        "Rate limit exceeded"
                    );
                    metrics::record_rate_limited();

                    Ok(AppError::from(exceeded).into_response())
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn limiter() -> FixedWindowLimiter {
        FixedWindowLimiter::new(100, HOUR).unwrap()
    }

    #[test]
    fn test_zero_limit_rejected() {
        assert!(matches!(
            FixedWindowLimiter::new(0, HOUR),
            Err(RateLimitError::ZeroLimit)
        ));
        assert!(matches!(
            FixedWindowLimiter::new(10, Duration::ZERO),
            Err(RateLimitError::ZeroWindow)
        ));
    }

    #[test]
    fn test_first_hundred_allowed_then_rejected() {
        let limiter = limiter();
        let now = Instant::now();

        for i in 1..=100 {
            assert!(limiter.check_at("client", now).is_ok(), "request {i}");
        }

        let err = limiter.check_at("client", now).unwrap_err();
        assert_eq!(err.retry_after_secs, 3600);
        assert_eq!(err.limit, 100);
    }

    #[test]
    fn test_first_request_creates_window() {
        let limiter = limiter();
        let now = Instant::now();

        limiter.check_at("client", now).unwrap();

        let window = limiter.window_for("client").unwrap();
        assert_eq!(window.count, 1);
        assert_eq!(window.reset_at, now + HOUR);
    }

    #[test]
    fn test_counter_keeps_advancing_past_limit() {
        let limiter = FixedWindowLimiter::new(2, HOUR).unwrap();
        let now = Instant::now();

        for _ in 0..5 {
            let _ = limiter.check_at("client", now);
        }

        assert_eq!(limiter.window_for("client").unwrap().count, 5);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let limiter = FixedWindowLimiter::new(1, HOUR).unwrap();
        let start = Instant::now();
        limiter.check_at("client", start).unwrap();

        let later = start + Duration::from_millis(1_500);
        let err = limiter.check_at("client", later).unwrap_err();

        // 3598.5s remaining rounds up to 3599
        assert_eq!(err.retry_after_secs, 3599);
    }

    #[test]
    fn test_retry_after_just_before_reset_is_positive() {
        let limiter = FixedWindowLimiter::new(1, HOUR).unwrap();
        let start = Instant::now();
        limiter.check_at("client", start).unwrap();

        let err = limiter
            .check_at("client", start + HOUR - Duration::from_millis(1))
            .unwrap_err();
        assert_eq!(err.retry_after_secs, 1);
    }

    #[test]
    fn test_window_resets_at_boundary() {
        let limiter = FixedWindowLimiter::new(1, HOUR).unwrap();
        let start = Instant::now();

        limiter.check_at("client", start).unwrap();
        assert!(limiter.check_at("client", start).is_err());

        let after = start + HOUR;
        assert!(limiter.check_at("client", after).is_ok());

        let window = limiter.window_for("client").unwrap();
        assert_eq!(window.count, 1);
        assert_eq!(window.reset_at, after + HOUR);
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = FixedWindowLimiter::new(1, HOUR).unwrap();
        let now = Instant::now();

        limiter.check_at("a", now).unwrap();
        limiter.check_at("b", now).unwrap();
        assert!(limiter.check_at("a", now).is_err());
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_sweep_removes_only_expired_windows() {
        let limiter = limiter();
        let start = Instant::now();

        limiter.check_at("old", start).unwrap();
        limiter
            .check_at("fresh", start + Duration::from_secs(1800))
            .unwrap();

        let removed = limiter.sweep_expired(start + HOUR);
        assert_eq!(removed, 1);
        assert!(limiter.window_for("old").is_none());
        assert!(limiter.window_for("fresh").is_some());
    }

    #[test]
    fn test_exceeded_message() {
        let err = RateLimitExceeded {
            retry_after_secs: 10,
            limit: 100,
            window: HOUR,
        };
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded. Max 100 requests per hour."
        );
    }

    #[test]
    fn test_describe_window() {
        assert_eq!(describe_window(&Duration::from_secs(60)), "minute");
        assert_eq!(describe_window(&Duration::from_secs(7200)), "2 hours");
        assert_eq!(describe_window(&Duration::from_secs(90)), "90 seconds");
    }

    #[test]
    fn test_layer_trusts_proxies_only_when_configured() {
        let limiter = Arc::new(limiter());

        let layer = RateLimitLayer::new(limiter.clone(), &[]);
        assert!(!layer.trusts_proxies());

        let layer = RateLimitLayer::new(limiter, &["10.0.0.0/8".to_string()]);
        assert!(layer.trusts_proxies());
    }

    #[tokio::test]
    async fn test_sweeper_start_and_stop() {
        let limiter = Arc::new(
            FixedWindowLimiter::new(10, HOUR)
                .unwrap()
                .with_sweep_interval(Duration::from_millis(10)),
        );
        limiter.start_sweeper();
        limiter.start_sweeper(); // idempotent

        limiter.stop().await;
        assert!(limiter.task_tracker.is_closed());
    }

    #[tokio::test]
    async fn test_sweeper_removes_expired_windows() {
        let limiter = Arc::new(
            FixedWindowLimiter::new(10, Duration::from_millis(20))
                .unwrap()
                .with_sweep_interval(Duration::from_millis(20)),
        );
        limiter.check("client").unwrap();
        limiter.start_sweeper();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(limiter.tracked_clients(), 0);

        limiter.stop().await;
    }
}
