use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"healthy"` while the process serves requests
    pub status: &'static str,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
    /// Service identifier
    pub service: &'static str,
    /// Service version
    pub version: &'static str,
}

/// Statistics response.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Client identities currently held in the rate table
    pub tracked_clients: usize,
    /// Requests allowed per window, 0 when rate limiting is disabled
    pub rate_limit_max_requests: u32,
    /// Window length in seconds
    pub rate_limit_window_secs: u64,
    /// Upstream responses relayed since startup
    pub requests_forwarded: u64,
    /// Upstream failures since startup
    pub upstream_failures: u64,
    /// Uptime in seconds
    pub uptime_seconds: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy",
            timestamp: Utc::now(),
            service: "integrated-server-proxy",
            version: "0.1.0",
        };

        let json = serde_json::to_value(&response).expect("Serialization should succeed");
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["service"], "integrated-server-proxy");
        // RFC 3339 with a UTC marker
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_stats_response_field_names() {
        let response = StatsResponse {
            tracked_clients: 3,
            rate_limit_max_requests: 100,
            rate_limit_window_secs: 3600,
            requests_forwarded: 10,
            upstream_failures: 1,
            uptime_seconds: 60,
        };

        let json = serde_json::to_value(&response).expect("Serialization should succeed");
        assert_eq!(json["tracked_clients"], 3);
        assert_eq!(json["rate_limit_max_requests"], 100);
        assert_eq!(json["rate_limit_window_secs"], 3600);
        assert_eq!(json["upstream_failures"], 1);
    }
}
