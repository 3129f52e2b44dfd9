//! Per-user submission quota.
//!
//! A sliding window of submission timestamps per user. A submission is
//! allowed while fewer than `limit` submissions happened in the last
//! `interval`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::RequestsConfig;
use crate::queue::UserId;

pub struct RequestQuota {
    /// Sliding window of submission timestamps per user.
    windows: Mutex<HashMap<UserId, VecDeque<Instant>>>,
    limit: usize,
    interval: Duration,
}

impl RequestQuota {
    pub fn new(limit: usize, interval: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            limit,
            interval,
        }
    }

    pub fn from_config(config: &RequestsConfig) -> Self {
        Self::new(
            config.limit as usize,
            Duration::from_secs(config.interval_sec),
        )
    }

    /// Consume one slot for `user` if one is free.
    ///
    /// Returns `false` without recording anything when the user is at the
    /// limit.
    pub fn try_acquire(&self, user: UserId) -> bool {
        self.try_acquire_at(user, Instant::now())
    }

    pub(crate) fn try_acquire_at(&self, user: UserId, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let window = windows.entry(user).or_default();
        while window
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= self.interval)
        {
            window.pop_front();
        }

        if window.len() >= self.limit {
            debug!(user, count = window.len(), limit = self.limit, "request quota reached");
            return false;
        }
        window.push_back(now);
        true
    }

    /// Submissions `user` still has in the current window.
    pub fn remaining(&self, user: UserId) -> usize {
        let now = Instant::now();
        let windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let used = windows.get(&user).map_or(0, |w| {
            w.iter()
                .filter(|t| now.saturating_duration_since(**t) < self.interval)
                .count()
        });
        self.limit.saturating_sub(used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_within_window() {
        let quota = RequestQuota::new(2, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(quota.try_acquire_at(1, t0));
        assert!(quota.try_acquire_at(1, t0 + Duration::from_secs(1)));
        assert!(!quota.try_acquire_at(1, t0 + Duration::from_secs(2)));
        // Other users have their own window.
        assert!(quota.try_acquire_at(2, t0 + Duration::from_secs(2)));
    }

    #[test]
    fn test_window_slides() {
        let quota = RequestQuota::new(1, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(quota.try_acquire_at(1, t0));
        assert!(!quota.try_acquire_at(1, t0 + Duration::from_secs(59)));
        assert!(quota.try_acquire_at(1, t0 + Duration::from_secs(60)));
    }

    #[test]
    fn test_remaining() {
        let quota = RequestQuota::new(3, Duration::from_secs(600));
        assert_eq!(quota.remaining(4), 3);
        quota.try_acquire(4);
        assert_eq!(quota.remaining(4), 2);
    }

    #[test]
    fn test_zero_limit_refuses_everything() {
        let quota = RequestQuota::new(0, Duration::from_secs(60));
        assert!(!quota.try_acquire(1));
    }
}
