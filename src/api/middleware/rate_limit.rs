use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::ConnectInfo;
use dashmap::DashMap;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};

use crate::error::{AppError, AppResult};

/// Per-IP token-bucket limiter backed by a DashMap for concurrent access.
pub struct IpRateLimiter {
    limiters: DashMap<IpAddr, Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
    quota: Quota,
}

impl IpRateLimiter {
    pub fn new(quota: Quota) -> Self {
        Self {
            limiters: DashMap::new(),
            quota,
        }
    }

    pub fn per_second(count: u32) -> Self {
        Self::new(Quota::per_second(NonZeroU32::new(count).expect("nonzero quota")))
    }

    pub fn per_minute(count: u32) -> Self {
        Self::new(Quota::per_minute(NonZeroU32::new(count).expect("nonzero quota")))
    }

    pub fn per_hour(count: u32) -> Self {
        Self::new(Quota::per_hour(NonZeroU32::new(count).expect("nonzero quota")))
    }

    pub fn check(&self, ip: IpAddr) -> bool {
        let limiter = self
            .limiters
            .entry(ip)
            .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)));
        limiter.check().is_ok()
    }

    pub fn enforce(&self, ip: IpAddr) -> AppResult<()> {
        if self.check(ip) {
            Ok(())
        } else {
            tracing::warn!(ip = %ip, "Rate limit exceeded");
            Err(AppError::RateLimited)
        }
    }

    /// Clear all entries when the map grows too large; limiters are
    /// recreated on the next request from each IP.
    pub fn cleanup(&self) {
        if self.limiters.len() > 10_000 {
            self.limiters.clear();
            tracing::info!("Rate limiter cache cleared due to size threshold");
        }
    }
}

/// The per-operation quota table, one bucket set per source IP.
pub struct RateLimits {
    pub submit: IpRateLimiter,
    pub edit: IpRateLimiter,
    pub delete: IpRateLimiter,
    pub recover: IpRateLimiter,
    pub review: IpRateLimiter,
    pub search: IpRateLimiter,
    pub search_api: IpRateLimiter,
    pub payment_status: IpRateLimiter,
}

impl RateLimits {
    pub fn new() -> Self {
        Self {
            submit: IpRateLimiter::per_hour(20),
            edit: IpRateLimiter::per_hour(20),
            delete: IpRateLimiter::per_hour(10),
            recover: IpRateLimiter::per_hour(20),
            review: IpRateLimiter::per_hour(20),
            search: IpRateLimiter::per_second(2),
            search_api: IpRateLimiter::per_minute(2),
            payment_status: IpRateLimiter::per_minute(30),
        }
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self::new()
    }
}

/// Source IP of the request. Loopback when no connect info is available
/// (e.g. in-process test harnesses).
pub fn peer_ip(addr: Option<&ConnectInfo<SocketAddr>>) -> IpAddr {
    addr.map(|ConnectInfo(socket)| socket.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_empties_then_refuses() {
        let limiter = IpRateLimiter::per_hour(2);
        let ip: IpAddr = "192.0.2.10".parse().unwrap();

        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));
    }

    #[test]
    fn ips_have_independent_buckets() {
        let limiter = IpRateLimiter::per_hour(1);
        let a: IpAddr = "192.0.2.1".parse().unwrap();
        let b: IpAddr = "192.0.2.2".parse().unwrap();

        assert!(limiter.check(a));
        assert!(!limiter.check(a));
        assert!(limiter.check(b));
    }

    #[test]
    fn enforce_maps_to_rate_limited_error() {
        let limiter = IpRateLimiter::per_hour(1);
        let ip: IpAddr = "192.0.2.3".parse().unwrap();

        assert!(limiter.enforce(ip).is_ok());
        assert!(matches!(limiter.enforce(ip), Err(AppError::RateLimited)));
    }
}
