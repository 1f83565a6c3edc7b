//! Public API tests for target validation and the rate limiter.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::{Duration, Instant};

use integrated_server_proxy::validation::{Scheme, check_private_network};
use integrated_server_proxy::{FixedWindowLimiter, ValidationError, validate};

mod validation_tests {
    use super::*;

    #[test]
    fn test_origin_is_scheme_host_port() {
        let cases = [
            ("http://example.com", "http://example.com", Scheme::Http),
            ("https://example.com/a/b", "https://example.com", Scheme::Https),
            ("http://api.example.com:8080/x?y=1", "http://api.example.com:8080", Scheme::Http),
            ("https://93.184.216.34/", "https://93.184.216.34", Scheme::Https),
        ];

        for (raw, origin, scheme) in cases {
            let target = validate(raw).unwrap();
            assert_eq!(target.origin, origin, "{raw}");
            assert_eq!(target.scheme, scheme, "{raw}");
        }
    }

    #[test]
    fn test_blacklisted_substrings_anywhere_in_host() {
        for raw in [
            "http://localhost",
            "https://localhost.example.com/",
            "http://my-localhost-box:9000/",
            "http://127.0.0.1.nip.io/",
            "http://0.0.0.0/",
        ] {
            assert!(
                matches!(validate(raw), Err(ValidationError::BlockedDomain(_))),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_non_http_schemes() {
        for raw in ["ftp://x", "file:///etc/passwd", "ws://example.com/socket"] {
            assert!(
                matches!(validate(raw), Err(ValidationError::UnsupportedScheme(_))),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_private_network_check_is_separate() {
        // The blacklist alone lets private literals through
        let target = validate("http://192.168.1.1/router").unwrap();
        assert!(matches!(
            check_private_network(&target),
            Err(ValidationError::BlockedDomain(_))
        ));

        let public = validate("http://8.8.8.8/").unwrap();
        assert!(check_private_network(&public).is_ok());
    }
}

mod rate_limit_tests {
    use super::*;

    #[test]
    fn test_hundred_and_first_request_rejected() {
        let limiter = FixedWindowLimiter::new(100, Duration::from_secs(3600)).unwrap();
        let start = Instant::now();

        for i in 0..100 {
            let now = start + Duration::from_secs(i);
            assert!(limiter.check_at("fresh-client", now).is_ok(), "request {}", i + 1);
        }

        let exceeded = limiter
            .check_at("fresh-client", start + Duration::from_secs(100))
            .unwrap_err();
        assert!(exceeded.retry_after_secs > 0);
        assert_eq!(exceeded.retry_after_secs, 3500);
    }

    #[test]
    fn test_request_after_reset_starts_new_window() {
        let window = Duration::from_secs(60);
        let limiter = FixedWindowLimiter::new(1, window).unwrap();
        let start = Instant::now();

        assert!(limiter.check_at("client", start).is_ok());
        assert!(limiter.check_at("client", start + Duration::from_secs(1)).is_err());

        let after_reset = start + window;
        assert!(limiter.check_at("client", after_reset).is_ok());

        let current = limiter.window_for("client").unwrap();
        assert_eq!(current.count, 1);
        assert_eq!(current.reset_at, after_reset + window);
    }
}
