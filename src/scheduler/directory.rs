//! In-process user directory.
//!
//! Keeps the last-activity time, privilege and ban flag of every listener the
//! daemon has heard from. "Active" means having acted within the configured
//! recency window.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use super::ports::UserDirectory;
use crate::config::UsersConfig;
use crate::queue::UserId;

struct DirectoryInner {
    last_activity: HashMap<UserId, DateTime<Utc>>,
    superusers: HashSet<UserId>,
    banned: HashSet<UserId>,
}

pub struct MemoryDirectory {
    inner: RwLock<DirectoryInner>,
    active_window: Duration,
}

impl MemoryDirectory {
    pub fn new(active_window: Duration) -> Self {
        Self {
            inner: RwLock::new(DirectoryInner {
                last_activity: HashMap::new(),
                superusers: HashSet::new(),
                banned: HashSet::new(),
            }),
            active_window,
        }
    }

    /// Directory seeded with the configured superusers and bans.
    pub fn from_config(users: &UsersConfig, active_window_minutes: u64) -> Self {
        let minutes = active_window_minutes.min(u64::from(u32::MAX)) as i64;
        let directory = Self::new(Duration::minutes(minutes));
        {
            let mut inner = directory.write();
            inner.superusers.extend(users.superusers.iter().copied());
            inner.banned.extend(users.banned.iter().copied());
        }
        directory
    }

    fn read(&self) -> RwLockReadGuard<'_, DirectoryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DirectoryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record activity at an explicit time.
    pub fn touch_at(&self, user: UserId, at: DateTime<Utc>) {
        self.write().last_activity.insert(user, at);
    }

    fn cutoff(&self) -> DateTime<Utc> {
        Utc::now() - self.active_window
    }
}

impl UserDirectory for MemoryDirectory {
    fn is_active(&self, user: UserId) -> bool {
        let cutoff = self.cutoff();
        self.read()
            .last_activity
            .get(&user)
            .is_some_and(|at| *at > cutoff)
    }

    fn is_superuser(&self, user: UserId) -> bool {
        self.read().superusers.contains(&user)
    }

    fn is_banned(&self, user: UserId) -> bool {
        self.read().banned.contains(&user)
    }

    fn active_count(&self) -> usize {
        let cutoff = self.cutoff();
        self.read()
            .last_activity
            .values()
            .filter(|at| **at > cutoff)
            .count()
    }

    fn record_activity(&self, user: UserId) {
        self.touch_at(user, Utc::now());
    }

    fn set_banned(&self, user: UserId, banned: bool) {
        let mut inner = self.write();
        if banned {
            inner.banned.insert(user);
        } else {
            inner.banned.remove(&user);
        }
        info!(user, banned, "ban flag changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_window() {
        let dir = MemoryDirectory::new(Duration::minutes(60));
        dir.record_activity(1);
        dir.touch_at(2, Utc::now() - Duration::minutes(61));

        assert!(dir.is_active(1));
        assert!(!dir.is_active(2));
        assert!(!dir.is_active(3));
        assert_eq!(dir.active_count(), 1);
    }

    #[test]
    fn test_seeded_from_config() {
        let users = UsersConfig {
            superusers: vec![10],
            banned: vec![20],
        };
        let dir = MemoryDirectory::from_config(&users, 60);
        assert!(dir.is_superuser(10));
        assert!(!dir.is_superuser(20));
        assert!(dir.is_banned(20));

        dir.set_banned(20, false);
        dir.set_banned(10, true);
        assert!(!dir.is_banned(20));
        assert!(dir.is_banned(10));
    }
}
