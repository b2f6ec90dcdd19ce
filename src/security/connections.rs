//! Per-user cap on long-lived WebSocket connections.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::model::UserId;
use crate::observability::metrics;

/// Open connection counts per user.
#[derive(Default)]
pub struct ConnectionTracker {
    counts: DashMap<UserId, usize>,
    total: AtomicUsize,
}

/// Releases its slot when dropped.
pub struct ConnectionGuard {
    tracker: Arc<ConnectionTracker>,
    user_id: UserId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.tracker.release(self.user_id);
    }
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a slot for `user_id`, or `None` when the user is at `limit`.
    pub fn try_acquire(self: &Arc<Self>, user_id: UserId, limit: usize) -> Option<ConnectionGuard> {
        let mut count = self.counts.entry(user_id).or_insert(0);
        if *count >= limit {
            return None;
        }
        *count += 1;
        drop(count);

        let total = self.total.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::record_ws_connections(total);
        Some(ConnectionGuard {
            tracker: self.clone(),
            user_id,
        })
    }

    fn release(&self, user_id: UserId) {
        self.counts.remove_if_mut(&user_id, |_, count| {
            *count = count.saturating_sub(1);
            *count == 0
        });
        let total = self
            .total
            .fetch_sub(1, Ordering::AcqRel)
            .saturating_sub(1);
        metrics::record_ws_connections(total);
    }

    pub fn for_user(&self, user_id: UserId) -> usize {
        self.counts.get(&user_id).map(|c| *c).unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_and_release() {
        let tracker = Arc::new(ConnectionTracker::new());
        let user = UserId::new();

        let first = tracker.try_acquire(user, 2).unwrap();
        let _second = tracker.try_acquire(user, 2).unwrap();
        assert!(tracker.try_acquire(user, 2).is_none());
        assert!(tracker.try_acquire(UserId::new(), 2).is_some());
        assert_eq!(tracker.for_user(user), 2);

        drop(first);
        assert_eq!(tracker.for_user(user), 1);
        assert!(tracker.try_acquire(user, 2).is_some());
    }

    #[test]
    fn test_counts_cleared_when_last_closes() {
        let tracker = Arc::new(ConnectionTracker::new());
        let user = UserId::new();
        let guard = tracker.try_acquire(user, 1).unwrap();
        assert_eq!(tracker.total(), 1);
        drop(guard);
        assert_eq!(tracker.total(), 0);
        assert_eq!(tracker.for_user(user), 0);
    }
}
