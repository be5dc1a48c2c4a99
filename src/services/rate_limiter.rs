use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

struct Window {
    count: u32,
    expires_at: i64,
}

/// Fixed-window request counter keyed by client address.
pub struct RateLimiter {
    max_requests: u32,
    window_ms: i64,
    windows: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_ms: i64) -> Self {
        RateLimiter {
            max_requests,
            window_ms,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config() -> Self {
        Self::new(
            crate::config::Config::rate_limit_max_requests(),
            crate::config::Config::rate_limit_window_ms(),
        )
    }

    /// Counts one request and returns whether it is within the limit.
    pub fn check(&self, client: IpAddr, now_ms: i64) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        if windows.len() > 10_000 {
            windows.retain(|_, w| w.expires_at > now_ms);
        }

        let window = windows.entry(client).or_insert(Window {
            count: 0,
            expires_at: now_ms + self.window_ms,
        });

        // Window expired → reset
        if window.expires_at <= now_ms {
            window.count = 0;
            window.expires_at = now_ms + self.window_ms;
        }

        if window.count >= self.max_requests {
            return false;
        }

        window.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    #[test]
    fn blocks_after_limit_within_window() {
        let limiter = RateLimiter::new(3, 1_000);
        assert!(limiter.check(ip(1), 0));
        assert!(limiter.check(ip(1), 10));
        assert!(limiter.check(ip(1), 20));
        assert!(!limiter.check(ip(1), 30));
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = RateLimiter::new(1, 1_000);
        assert!(limiter.check(ip(1), 0));
        assert!(!limiter.check(ip(1), 999));
        assert!(limiter.check(ip(1), 1_000));
    }

    #[test]
    fn clients_are_counted_separately() {
        let limiter = RateLimiter::new(1, 1_000);
        assert!(limiter.check(ip(1), 0));
        assert!(limiter.check(ip(2), 0));
        assert!(!limiter.check(ip(1), 1));
    }
}
