mod health;
mod proxy;

pub use health::{health_check, stats};
pub use proxy::{proxy_request, target_url_param};
