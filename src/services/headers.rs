//! Header rewriting around the upstream call.
//!
//! # Outbound (caller → upstream)
//!
//! - Credentials are dropped: `Cookie`, `Cookie2`, `Authorization`
//! - `Host` and `Content-Length` are dropped; the client derives them from
//!   the target URL and body
//! - Hop-by-hop headers, and any header named in `Connection`, are dropped
//! - `X-Request-Timeout` is consumed by the proxy and dropped
//! - `User-Agent` is replaced with [`PROXY_USER_AGENT`]
//!
//! # Inbound (upstream → caller)
//!
//! - `Set-Cookie` / `Set-Cookie2` are dropped so targets cannot plant
//!   cookies under the proxy's origin
//! - Hop-by-hop headers are dropped
//! - `X-Proxied-By`, `X-Request-Url` and permissive CORS headers are added

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, AUTHORIZATION, CONNECTION,
    CONTENT_LENGTH, COOKIE, HOST, HeaderMap, HeaderName, HeaderValue, SET_COOKIE, USER_AGENT,
};

use crate::middleware::REQUEST_TIMEOUT_HEADER;
use crate::validation::ProxyTarget;

/// Identifier sent in `X-Proxied-By`.
pub const PROXY_IDENTIFIER: &str = "integrated-server-proxy";

/// `User-Agent` presented to every upstream.
pub const PROXY_USER_AGENT: &str = concat!("integrated-server-proxy/", env!("CARGO_PKG_VERSION"));

pub const X_PROXIED_BY: HeaderName = HeaderName::from_static("x-proxied-by");
pub const X_REQUEST_URL: HeaderName = HeaderName::from_static("x-request-url");

/// RFC 7230 §6.1 connection-scoped headers, plus the legacy `proxy-connection`.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Header names listed in the `Connection` header's value.
fn connection_listed(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect()
}

fn is_outbound_stripped(name: &HeaderName) -> bool {
    *name == COOKIE
        || name.as_str() == "cookie2"
        || *name == AUTHORIZATION
        || *name == HOST
        || *name == CONTENT_LENGTH
        || *name == USER_AGENT
        || name.as_str() == REQUEST_TIMEOUT_HEADER
        || is_hop_by_hop(name)
}

/// Build the header set sent upstream from the caller's headers.
pub fn rewrite_outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let listed = connection_listed(inbound);
    let mut outbound = HeaderMap::with_capacity(inbound.len() + 1);

    for (name, value) in inbound {
        if is_outbound_stripped(name) || listed.contains(name) {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }

    outbound.insert(USER_AGENT, HeaderValue::from_static(PROXY_USER_AGENT));
    outbound
}

/// Rewrite upstream response headers in place before relaying them.
pub fn rewrite_inbound_headers(headers: &mut HeaderMap, target: &ProxyTarget) {
    for name in connection_listed(headers) {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(SET_COOKIE);
    headers.remove("set-cookie2");

    headers.insert(X_PROXIED_BY, HeaderValue::from_static(PROXY_IDENTIFIER));
    if let Some(value) = request_url_value(target) {
        headers.insert(X_REQUEST_URL, value);
    }
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, HeaderValue::from_static("*"));
}

/// The caller's URL as a header value, falling back to the normalized
/// (ASCII-only) form when the raw string is not a legal header value.
fn request_url_value(target: &ProxyTarget) -> Option<HeaderValue> {
    HeaderValue::from_str(&target.raw)
        .or_else(|_| HeaderValue::from_str(target.url().as_str()))
        .ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::validation::validate;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_outbound_strips_credentials() {
        let inbound = headers(&[
            ("authorization", "Bearer xyz"),
            ("cookie", "session=abc"),
            ("cookie2", "$Version=1"),
            ("accept", "application/json"),
        ]);

        let outbound = rewrite_outbound_headers(&inbound);

        assert!(outbound.get(AUTHORIZATION).is_none());
        assert!(outbound.get(COOKIE).is_none());
        assert!(outbound.get("cookie2").is_none());
        assert_eq!(outbound.get("accept").unwrap(), "application/json");
    }

    #[test]
    fn test_outbound_sets_user_agent() {
        let inbound = headers(&[("user-agent", "curl/8.0")]);
        let outbound = rewrite_outbound_headers(&inbound);

        assert_eq!(outbound.get_all(USER_AGENT).iter().count(), 1);
        assert_eq!(outbound.get(USER_AGENT).unwrap(), PROXY_USER_AGENT);
    }

    #[test]
    fn test_outbound_drops_host_and_hop_by_hop() {
        let inbound = headers(&[
            ("host", "proxy.internal:3000"),
            ("connection", "keep-alive, x-secret-hop"),
            ("keep-alive", "timeout=5"),
            ("x-secret-hop", "1"),
            ("transfer-encoding", "chunked"),
            ("content-length", "12"),
            ("x-request-timeout", "5000"),
            ("x-custom", "kept"),
        ]);

        let outbound = rewrite_outbound_headers(&inbound);

        for name in [
            "host",
            "connection",
            "keep-alive",
            "x-secret-hop",
            "transfer-encoding",
            "content-length",
            "x-request-timeout",
        ] {
            assert!(outbound.get(name).is_none(), "{name} should be dropped");
        }
        assert_eq!(outbound.get("x-custom").unwrap(), "kept");
    }

    #[test]
    fn test_outbound_preserves_repeated_headers() {
        let inbound = headers(&[("accept-language", "en"), ("accept-language", "de")]);
        let outbound = rewrite_outbound_headers(&inbound);

        assert_eq!(outbound.get_all("accept-language").iter().count(), 2);
    }

    #[test]
    fn test_inbound_strips_cookies_and_adds_proxy_headers() {
        let target = validate("https://example.com/status/200").unwrap();
        let mut response = headers(&[
            ("set-cookie", "foo=bar"),
            ("set-cookie", "baz=qux"),
            ("set-cookie2", "old=style"),
            ("content-type", "application/json"),
        ]);

        rewrite_inbound_headers(&mut response, &target);

        assert!(response.get(SET_COOKIE).is_none());
        assert!(response.get("set-cookie2").is_none());
        assert_eq!(response.get("content-type").unwrap(), "application/json");
        assert_eq!(response.get(X_PROXIED_BY).unwrap(), PROXY_IDENTIFIER);
        assert_eq!(
            response.get(X_REQUEST_URL).unwrap(),
            "https://example.com/status/200"
        );
        assert_eq!(response.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert_eq!(response.get(ACCESS_CONTROL_EXPOSE_HEADERS).unwrap(), "*");
    }

    #[test]
    fn test_inbound_replaces_upstream_cors_origin() {
        let target = validate("https://example.com/").unwrap();
        let mut response = headers(&[("access-control-allow-origin", "https://only.example.com")]);

        rewrite_inbound_headers(&mut response, &target);

        let values: Vec<_> = response.get_all(ACCESS_CONTROL_ALLOW_ORIGIN).iter().collect();
        assert_eq!(values, vec!["*"]);
    }

    #[test]
    fn test_inbound_drops_hop_by_hop() {
        let target = validate("https://example.com/").unwrap();
        let mut response = headers(&[
            ("transfer-encoding", "chunked"),
            ("connection", "close"),
            ("content-length", "5"),
        ]);

        rewrite_inbound_headers(&mut response, &target);

        assert!(response.get("transfer-encoding").is_none());
        assert!(response.get("connection").is_none());
        assert_eq!(response.get("content-length").unwrap(), "5");
    }
}
