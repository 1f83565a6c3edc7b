//! Client identity extraction for rate limiting.
//!
//! The identity that keys a caller's rate-limit window is looked up in a
//! fixed priority order:
//!
//! 1. The `Origin` request header, verbatim
//! 2. The client IP address (see below)
//! 3. The constant [`UNKNOWN_CLIENT`]
//!
//! # Client IP
//!
//! The client IP is the TCP peer address taken from Axum's `ConnectInfo`
//! extension. `X-Forwarded-For` (first entry) and `X-Real-IP` are honored
//! only when the peer itself lies inside a configured trusted proxy range;
//! otherwise those headers are ignored so callers cannot pick their own
//! rate-limit bucket by spoofing them.
//!
//! # Shared Buckets
//!
//! Every caller that sends an `Origin` header with the same value shares one
//! bucket regardless of IP, and every request without an `Origin` header and
//! without a resolvable peer address lands in the `"unknown"` bucket.
//! Originless clients behind the same NAT share their IP's bucket.
//!
//! ```text
//!   Origin header? ──yes──► "https://app.example.com"
//!        │ no
//!        ▼
//!   peer trusted + X-Forwarded-For? ──yes──► "203.0.113.50"
//!        │ no
//!        ▼
//!   peer address? ──yes──► "198.51.100.7"
//!        │ no
//!        ▼
//!     "unknown"
//! ```

use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::http::header::ORIGIN;
use tracing::debug;

use crate::net::{CidrRange, parse_cidr_list};

/// Identity used when neither an `Origin` header nor a client IP is available.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Networks whose forwarding headers are believed.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
}

impl TrustedProxyConfig {
    /// Build from CIDR strings; invalid entries are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges = parse_cidr_list(cidrs);

        if !ranges.is_empty() {
            debug!(count = ranges.len(), "Trusted proxy ranges configured");
        }

        Self { ranges }
    }

    /// Check if any trusted ranges are configured.
    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Check if a peer address belongs to a trusted proxy.
    ///
    /// With no ranges configured nothing is trusted.
    pub fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.ranges.iter().any(|range| range.contains(ip))
    }
}

/// Read the first forwarded client address from proxy headers.
#[inline]
fn forwarded_ip<B>(req: &Request<B>) -> Option<&str> {
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next().map(str::trim)
        && !first.is_empty()
    {
        return Some(first);
    }

    req.headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// TCP peer address recorded by `into_make_service_with_connect_info`.
#[inline]
pub fn peer_addr<B>(req: &Request<B>) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Resolve the caller's IP address.
///
/// Returns `None` when the request carries no connection info.
pub fn client_ip<B>(req: &Request<B>, trusted_proxies: &TrustedProxyConfig) -> Option<String> {
    let peer = peer_addr(req)?.ip();

    if trusted_proxies.is_trusted(&peer)
        && let Some(forwarded) = forwarded_ip(req)
    {
        debug!(
            peer = %peer,
            client_ip = %forwarded,
            "Using forwarded client IP from trusted proxy"
        );
        return Some(forwarded.to_string());
    }

    Some(peer.to_string())
}

/// Derive the rate-limit identity for a request.
///
/// # Returns
///
/// `Cow<'static, str>`: borrowed for [`UNKNOWN_CLIENT`], owned otherwise.
pub fn client_identity<B>(
    req: &Request<B>,
    trusted_proxies: &TrustedProxyConfig,
) -> Cow<'static, str> {
    if let Some(origin) = req.headers().get(ORIGIN)
        && let Ok(origin) = origin.to_str()
        && !origin.is_empty()
    {
        return Cow::Owned(origin.to_string());
    }

    match client_ip(req, trusted_proxies) {
        Some(ip) => Cow::Owned(ip),
        None => Cow::Borrowed(UNKNOWN_CLIENT),
    }
}
