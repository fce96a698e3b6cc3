use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fixed-window per-IP request limiter, checked before the origin/ban policy so an abusive
/// client is throttled regardless of what it claims its Origin header is.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    state: Arc<Mutex<HashMap<IpAddr, Window>>>,
}

#[derive(Debug)]
struct Window {
    count: u32,
    started_at: Instant,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// `true` if the request should proceed; `false` if `ip` has exceeded its window quota.
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        let window = state.entry(ip).or_insert_with(|| Window {
            count: 0,
            started_at: now,
        });

        if now.duration_since(window.started_at) >= self.window {
            window.count = 0;
            window.started_at = now;
        }

        window.count += 1;
        window.count <= self.max_requests
    }

    /// Drop windows that have long since expired, so a deployment under steady churn doesn't
    /// grow this map without bound.
    pub fn sweep(&self) {
        let now = Instant::now();
        let window = self.window;
        self.state
            .lock()
            .retain(|_, entry| now.duration_since(entry.started_at) < window * 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_requests_under_the_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
    }

    #[test]
    fn rejects_once_the_window_quota_is_exceeded() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));
    }

    #[test]
    fn different_ips_have_independent_windows() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let a: IpAddr = "127.0.0.1".parse().unwrap();
        let b: IpAddr = "127.0.0.2".parse().unwrap();

        assert!(limiter.check(a));
        assert!(limiter.check(b));
        assert!(!limiter.check(a));
    }
}
