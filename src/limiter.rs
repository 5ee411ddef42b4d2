//! Per-identity sliding-window rate limiter.
//!
//! A call is allowed iff fewer than `max_calls` timestamps for that
//! identity fall within the trailing window. Check-and-record is one
//! atomic unit per call: an allowed call appends its own timestamp before
//! the lock is released.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    records: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether `identity` is within the rate limit, recording the
    /// call if it is allowed.
    pub fn is_allowed(&self, identity: &str) -> bool {
        let now = Instant::now();
        let mut records = self.records.lock().unwrap();
        let calls = records.entry(identity.to_string()).or_default();
        calls.retain(|t| now.duration_since(*t) < self.window);

        if calls.len() >= self.max_calls {
            return false;
        }
        calls.push(now);
        true
    }

    /// How many calls the identity has left in the current window.
    pub fn remaining(&self, identity: &str) -> usize {
        let now = Instant::now();
        let records = self.records.lock().unwrap();
        let active = records
            .get(identity)
            .map(|calls| {
                calls
                    .iter()
                    .filter(|t| now.duration_since(**t) < self.window)
                    .count()
            })
            .unwrap_or(0);
        self.max_calls.saturating_sub(active)
    }

    /// Time until the identity can make another call. Zero when a slot is
    /// already free; otherwise derived from the oldest timestamp still
    /// inside the window.
    pub fn time_until_reset(&self, identity: &str) -> Duration {
        let now = Instant::now();
        let records = self.records.lock().unwrap();
        let Some(calls) = records.get(identity) else {
            return Duration::ZERO;
        };

        let active: Vec<&Instant> = calls
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .collect();
        if active.len() < self.max_calls {
            return Duration::ZERO;
        }

        // The oldest active call dictates when the next slot opens up.
        let oldest = active[0];
        self.window.saturating_sub(now.duration_since(*oldest))
    }

    /// Reset the limit for a specific identity.
    pub fn reset(&self, identity: &str) {
        self.records.lock().unwrap().remove(identity);
    }

    /// Reset all identities.
    pub fn reset_all(&self) {
        self.records.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_max_calls() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.is_allowed("x"));
        assert!(limiter.is_allowed("x"));
        assert!(limiter.is_allowed("x"));
        assert!(!limiter.is_allowed("x"));
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.is_allowed("x"));
        }
        assert!(!limiter.is_allowed("x"));
        assert!(limiter.is_allowed("y"));
    }

    #[test]
    fn test_remaining_counts_down() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert_eq!(limiter.remaining("x"), 3);
        limiter.is_allowed("x");
        assert_eq!(limiter.remaining("x"), 2);
        limiter.is_allowed("x");
        limiter.is_allowed("x");
        assert_eq!(limiter.remaining("x"), 0);
    }

    #[test]
    fn test_window_expiry_frees_slots() {
        let limiter = RateLimiter::new(2, Duration::from_millis(50));
        assert!(limiter.is_allowed("x"));
        assert!(limiter.is_allowed("x"));
        assert!(!limiter.is_allowed("x"));
        std::thread::sleep(Duration::from_millis(80));
        assert!(limiter.is_allowed("x"));
    }

    #[test]
    fn test_time_until_reset_zero_when_slot_free() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert_eq!(limiter.time_until_reset("x"), Duration::ZERO);
        limiter.is_allowed("x");
        assert_eq!(limiter.time_until_reset("x"), Duration::ZERO);
    }

    #[test]
    fn test_time_until_reset_bounded_by_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.is_allowed("x");
        let wait = limiter.time_until_reset("x");
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(60));
    }

    #[test]
    fn test_reset_single_identity() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.is_allowed("x");
        limiter.is_allowed("y");
        assert!(!limiter.is_allowed("x"));
        limiter.reset("x");
        assert!(limiter.is_allowed("x"));
        assert!(!limiter.is_allowed("y"));
    }

    #[test]
    fn test_reset_all() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.is_allowed("x");
        limiter.is_allowed("y");
        limiter.reset_all();
        assert!(limiter.is_allowed("x"));
        assert!(limiter.is_allowed("y"));
    }
}
