pub mod logging;
pub mod origin;
pub mod rate_limit;

pub use logging::{init_tracing, request_logging};
pub use origin::origin_check;
pub use rate_limit::{peer_ip, IpRateLimiter, RateLimits};
