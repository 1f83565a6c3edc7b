//! Fuzz target for target URL validation and request parsing helpers.
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```
//!
//! Beyond never panicking, an accepted target must hold up: an allowed
//! scheme, a host free of blacklisted substrings, and an upstream URL that
//! starts with its own origin.

#![no_main]

use integrated_server_proxy::handlers::target_url_param;
use integrated_server_proxy::middleware::RequestTimeout;
use integrated_server_proxy::net::CidrRange;
use integrated_server_proxy::validation::{
    BLOCKED_HOST_PATTERNS, check_private_network, validate,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(target) = validate(s) {
        assert!(target.origin.starts_with("http://") || target.origin.starts_with("https://"));
        assert!(
            BLOCKED_HOST_PATTERNS
                .iter()
                .all(|pattern| !target.host.contains(pattern))
        );
        assert!(target.upstream_url().starts_with(&target.origin));
        let _ = check_private_network(&target);
    }

    if let Some(raw) = target_url_param(Some(s)) {
        let _ = validate(&raw);
    }

    let _ = RequestTimeout::from_header(s);
    let _ = CidrRange::parse(s);
});
