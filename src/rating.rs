//! Community rating policy.
//!
//! A track is ejected once enough *active* listeners dislike it: at least
//! `min_haters` of them, and at least `threshold` as a fraction of everyone
//! active. Who counts as active is decided by the user directory; the guard
//! only sees the two counts.

use crate::config::RatingConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingGuard {
    threshold: f64,
    min_haters: usize,
}

impl Default for RatingGuard {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            min_haters: 3,
        }
    }
}

impl RatingGuard {
    pub fn new(threshold: f64, min_haters: usize) -> Self {
        Self {
            threshold,
            min_haters,
        }
    }

    pub fn from_config(config: &RatingConfig) -> Self {
        Self::new(config.threshold, config.min_haters)
    }

    /// Whether a track with `active_haters` dislikes may keep playing in
    /// front of `active_listeners` listeners.
    pub fn is_acceptable(&self, active_listeners: usize, active_haters: usize) -> bool {
        if active_listeners == 0 || active_haters < self.min_haters {
            return true;
        }
        (active_haters as f64) / (active_listeners as f64) < self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_listeners_is_acceptable() {
        let guard = RatingGuard::default();
        assert!(guard.is_acceptable(0, 0));
        assert!(guard.is_acceptable(0, 5));
    }

    #[test]
    fn test_threshold_boundary_rejects() {
        let guard = RatingGuard::default();
        assert!(!guard.is_acceptable(10, 3));
        assert!(!guard.is_acceptable(3, 3));
    }

    #[test]
    fn test_below_min_haters_is_acceptable() {
        let guard = RatingGuard::default();
        assert!(guard.is_acceptable(10, 2));
        assert!(guard.is_acceptable(2, 2));
    }

    #[test]
    fn test_below_threshold_is_acceptable() {
        let guard = RatingGuard::default();
        assert!(guard.is_acceptable(11, 3));
        assert!(guard.is_acceptable(100, 29));
        assert!(!guard.is_acceptable(100, 30));
    }

    #[test]
    fn test_custom_parameters() {
        let guard = RatingGuard::new(0.5, 1);
        assert!(!guard.is_acceptable(2, 1));
        assert!(guard.is_acceptable(3, 1));
    }
}
