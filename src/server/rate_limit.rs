//! Fixed-window per-address rate limiting.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

struct Window {
    started: Instant,
    count: u32,
}

/// Counts requests per IP in fixed windows. When a window is older than
/// the configured size it is reset rather than slid.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<IpAddr, Window>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    /// Allow `max_requests` per `window` per address.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            max_requests,
            window,
        }
    }

    /// Record one request from `addr`; returns whether it is allowed.
    pub fn check(&self, addr: IpAddr) -> bool {
        let mut entry = self.windows.entry(addr).or_insert_with(|| Window {
            started: Instant::now(),
            count: 0,
        });
        if entry.started.elapsed() > self.window {
            entry.started = Instant::now();
            entry.count = 0;
        }
        entry.count += 1;
        entry.count <= self.max_requests
    }

    /// Drop windows that have fully elapsed.
    pub fn sweep(&self) {
        self.windows
            .retain(|_, window| window.started.elapsed() <= self.window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([127, 0, 0, last])
    }

    #[test]
    fn requests_over_the_limit_are_rejected() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.check(ip(1)));
        assert!(limiter.check(ip(1)));
        assert!(limiter.check(ip(1)));
        assert!(!limiter.check(ip(1)));
    }

    #[test]
    fn addresses_are_limited_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check(ip(1)));
        assert!(!limiter.check(ip(1)));
        assert!(limiter.check(ip(2)));
    }

    #[test]
    fn window_resets_after_elapsing() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));
        assert!(limiter.check(ip(1)));
        assert!(!limiter.check(ip(1)));
        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.check(ip(1)));
    }

    #[test]
    fn sweep_drops_stale_windows() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));
        limiter.check(ip(1));
        std::thread::sleep(Duration::from_millis(20));
        limiter.sweep();
        assert!(limiter.windows.is_empty());
    }
}
