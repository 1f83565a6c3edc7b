pub mod forwarder;
pub mod headers;

pub use forwarder::{Forwarder, map_upstream_error};
pub use headers::{
    PROXY_IDENTIFIER, PROXY_USER_AGENT, rewrite_inbound_headers, rewrite_outbound_headers,
};
