//! Shared application state for Axum handlers.
//!
//! - **Forwarder**: Pooled upstream HTTP client
//! - **Rate Limiter**: Shared fixed-window table, `None` when disabled
//! - **Configuration**: Runtime configuration access
//!
//! # Structured Concurrency
//!
//! The only background task is the rate limiter's sweeper, tracked with
//! `tokio_util::task::TaskTracker` inside the limiter. Call `shutdown()` to
//! cancel and await it before exit.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::middleware::FixedWindowLimiter;
use crate::services::Forwarder;

/// Shared application state, cloned into every handler.
///
/// # Lifecycle
///
/// ```rust,ignore
/// let state = AppState::new(config)?;
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Upstream request forwarder
    pub forwarder: Forwarder,
    /// Rate limit table shared by the middleware and `/stats`
    pub rate_limiter: Option<Arc<FixedWindowLimiter>>,
    /// Timestamp when the application started
    pub started_at: Instant,
}

impl AppState {
    /// Build state from configuration, starting the rate limit sweeper.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the HTTP client or the rate limiter
    /// cannot be built.
    pub fn new(config: Config) -> AppResult<Self> {
        let forwarder = Forwarder::new(&config)?;
        Self::with_forwarder(config, forwarder)
    }

    /// Build state around an existing forwarder.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the rate limiter settings are invalid.
    pub fn with_forwarder(config: Config, forwarder: Forwarder) -> AppResult<Self> {
        let rate_limiter = if config.rate_limiting_enabled() {
            let limiter = FixedWindowLimiter::new(
                config.rate_limit_max_requests,
                config.rate_limit_window,
            )
            .map_err(|e| AppError::ConfigError(e.to_string()))?
            .with_sweep_interval(config.rate_limit_sweep_interval);

            let limiter = Arc::new(limiter);
            limiter.start_sweeper();
            Some(limiter)
        } else {
            None
        };

        Ok(Self {
            config: Arc::new(config),
            forwarder,
            rate_limiter,
            started_at: Instant::now(),
        })
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        if let Some(limiter) = &self.rate_limiter {
            limiter.stop().await;
        }

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_with_rate_limiting() {
        let state = AppState::new(Config::default()).unwrap();

        let limiter = state.rate_limiter.as_ref().unwrap();
        assert_eq!(limiter.limit(), 100);
        assert_eq!(limiter.tracked_clients(), 0);

        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_state_without_rate_limiting() {
        let config = Config {
            rate_limit_max_requests: 0,
            ..Config::default()
        };
        let state = AppState::new(config).unwrap();

        assert!(state.rate_limiter.is_none());
        state.shutdown().await;
    }
}
