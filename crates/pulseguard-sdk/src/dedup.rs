//! Time-windowed duplicate suppression.
//!
//! Errors thrown in a tight loop (an animation frame, a retrying request)
//! would otherwise produce one delivery per iteration. The cache keeps the
//! first sighting of a key and suppresses repeats until the window elapses.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// In-process set of recently-seen keys with a fixed TTL.
///
/// Purely a burst suppressor: not persisted, not shared across processes.
#[derive(Debug)]
pub struct DeduplicationCache {
    ttl: Duration,
    seen: HashMap<String, Instant>,
}

impl DeduplicationCache {
    /// Create a cache with the given suppression window.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: HashMap::new(),
        }
    }

    /// Check whether `key` was seen within the window, remembering it if not.
    ///
    /// The first call for a key returns `false`; every call within the TTL
    /// returns `true`; once the TTL has elapsed the key counts as new again.
    pub fn is_duplicate(&mut self, key: &str) -> bool {
        let now = Instant::now();
        self.seen.retain(|_, expires_at| *expires_at > now);

        if self.seen.contains_key(key) {
            return true;
        }
        self.seen.insert(key.to_owned(), now + self.ttl);
        false
    }

    /// Number of keys currently within their window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no key is currently suppressed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_sighting_is_not_duplicate() {
        let mut cache = DeduplicationCache::new(Duration::from_secs(10));
        assert!(!cache.is_duplicate("X"));
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_within_window_is_duplicate() {
        let mut cache = DeduplicationCache::new(Duration::from_secs(10));
        assert!(!cache.is_duplicate("X"));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cache.is_duplicate("X"));
    }

    #[tokio::test(start_paused = true)]
    async fn key_expires_after_ttl() {
        let mut cache = DeduplicationCache::new(Duration::from_secs(10));
        assert!(!cache.is_duplicate("X"));
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!cache.is_duplicate("X"));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let mut cache = DeduplicationCache::new(Duration::from_secs(10));
        assert!(!cache.is_duplicate("X"));
        assert!(!cache.is_duplicate("Y"));
        assert!(cache.is_duplicate("X"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_purged() {
        let mut cache = DeduplicationCache::new(Duration::from_secs(10));
        cache.is_duplicate("X");
        cache.is_duplicate("Y");
        assert_eq!(cache.len(), 2);

        tokio::time::advance(Duration::from_secs(11)).await;
        cache.is_duplicate("Z");
        assert_eq!(cache.len(), 1);
    }
}
