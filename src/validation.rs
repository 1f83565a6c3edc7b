//! Target URL validation.
//!
//! Every proxied request starts with a caller-supplied absolute URL. Before
//! anything goes upstream the URL is parsed and vetted:
//!
//! 1. It must be present and non-empty.
//! 2. It must parse as an absolute URL.
//! 3. The scheme must be exactly `http` or `https`.
//! 4. The hostname must not contain any of [`BLOCKED_HOST_PATTERNS`].
//!
//! The blacklist is a plain substring check over the normalized, lowercase
//! hostname. It does not understand private address ranges; that is what
//! [`check_private_network`] is for, applied as a separate layer on top.

use std::fmt;
use std::net::IpAddr;
use std::sync::LazyLock;

use thiserror::Error;
use url::{Host, Url};

use crate::net::CidrRange;

/// Hostname substrings that are never proxied.
pub const BLOCKED_HOST_PATTERNS: [&str; 3] = ["localhost", "127.0.0.1", "0.0.0.0"];

/// Address ranges rejected when private network blocking is enabled.
const PRIVATE_RANGES: [&str; 11] = [
    "0.0.0.0/8",
    "10.0.0.0/8",
    "100.64.0.0/10",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "::/128",
    "::1/128",
    "fc00::/7",
    "fe80::/10",
];

static PRIVATE_NETWORKS: LazyLock<Vec<CidrRange>> =
    LazyLock::new(|| PRIVATE_RANGES.iter().filter_map(|r| CidrRange::parse(r)).collect());

/// Reasons a target URL is refused.
///
/// The `Display` text of each variant is the message returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing \"url\" query parameter. Usage: /proxy?url=<target-url>")]
    MissingUrl,

    #[error("Invalid URL provided")]
    MalformedUrl(#[source] url::ParseError),

    #[error("Only HTTP and HTTPS protocols are supported")]
    UnsupportedScheme(String),

    #[error("Cannot proxy requests to internal/private URLs")]
    BlockedDomain(String),
}

/// Schemes the proxy will forward to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    fn from_url(url: &Url) -> Option<Self> {
        match url.scheme() {
            "http" => Some(Scheme::Http),
            "https" => Some(Scheme::Https),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated upstream destination.
///
/// Lives for the duration of one forwarded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    pub scheme: Scheme,
    /// Lowercase hostname; IPv6 literals keep their brackets.
    pub host: String,
    /// Explicit non-default port, if any.
    pub port: Option<u16>,
    /// `scheme://host[:port]`
    pub origin: String,
    /// Target path plus `?query` when present. Fragments are dropped.
    pub path_and_query: String,
    /// The URL exactly as the caller supplied it.
    pub raw: String,
    url: Url,
}

impl ProxyTarget {
    /// Full URL the forwarder requests: origin followed by the target's own path.
    pub fn upstream_url(&self) -> String {
        format!("{}{}", self.origin, self.path_and_query)
    }

    /// Parsed form of the target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Validate a caller-supplied target URL.
///
/// # Errors
///
/// See [`ValidationError`] for the failure cases, checked in declaration order.
///
/// # Example
///
/// ```
/// use integrated_server_proxy::validation::validate;
///
/// let target = validate("https://api.example.com/v1/data?x=1").unwrap();
/// assert_eq!(target.origin, "https://api.example.com");
/// assert_eq!(target.path_and_query, "/v1/data?x=1");
/// ```
pub fn validate(raw: &str) -> Result<ProxyTarget, ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::MissingUrl);
    }

    let url = Url::parse(raw).map_err(ValidationError::MalformedUrl)?;

    let scheme = Scheme::from_url(&url)
        .ok_or_else(|| ValidationError::UnsupportedScheme(url.scheme().to_string()))?;

    let host = url
        .host_str()
        .ok_or(ValidationError::MalformedUrl(url::ParseError::EmptyHost))?
        .to_ascii_lowercase();

    if is_blocked_host(&host) {
        return Err(ValidationError::BlockedDomain(host));
    }

    let port = url.port();
    let origin = match port {
        Some(port) => format!("{scheme}://{host}:{port}"),
        None => format!("{scheme}://{host}"),
    };

    let path_and_query = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };

    Ok(ProxyTarget {
        scheme,
        host,
        port,
        origin,
        path_and_query,
        raw: raw.to_string(),
        url,
    })
}

/// Substring blacklist check over a lowercase hostname.
pub fn is_blocked_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    BLOCKED_HOST_PATTERNS
        .iter()
        .any(|pattern| host.contains(pattern))
}

/// Reject targets whose host is a literal IP inside a private, loopback,
/// link-local, carrier-grade NAT or unspecified range.
///
/// Hostnames are not resolved here; only IP literals are checked.
///
/// # Errors
///
/// Returns [`ValidationError::BlockedDomain`] for addresses in those ranges.
pub fn check_private_network(target: &ProxyTarget) -> Result<(), ValidationError> {
    let ip = match target.url.host() {
        Some(Host::Ipv4(v4)) => IpAddr::V4(v4),
        Some(Host::Ipv6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        Some(Host::Domain(_)) | None => return Ok(()),
    };

    if is_private_ip(&ip) {
        return Err(ValidationError::BlockedDomain(target.host.clone()));
    }

    Ok(())
}

/// Check an address against the private network ranges.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    PRIVATE_NETWORKS.iter().any(|range| range.contains(ip))
}
