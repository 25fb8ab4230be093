//! Local Tier Implementation
//!
//! Bounded in-process cache in front of the shared tier, built on Moka.
//! Moka's TinyLFU admission keeps frequently read payloads resident and
//! only lets a new entry displace a colder one once capacity is reached.

use std::time::Duration;

use moka::sync::Cache;
use tracing::{debug, trace};

/// Default maximum number of payloads held in process
pub const DEFAULT_LOCAL_CAPACITY: u64 = 1000;

/// Default retention window for a locally cached payload
pub const DEFAULT_LOCAL_RETENTION: Duration = Duration::from_secs(60);

/// In-process payload cache with a hard entry cap
pub struct LocalTier {
    /// Payloads by identifier, stored exactly as extracted
    entries: Cache<String, String>,
}

impl LocalTier {
    /// Create a local tier with default capacity and retention
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_LOCAL_CAPACITY, DEFAULT_LOCAL_RETENTION)
    }

    /// Create a local tier with custom limits
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of entries kept in process
    /// * `retention` - How long an entry may live locally before it must be
    ///   re-read from the shared tier
    pub fn with_limits(capacity: u64, retention: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(retention)
            .name("local_payload_cache")
            .build();

        Self { entries }
    }

    /// Get a payload from the local tier
    ///
    /// Every lookup, hit or miss, feeds the frequency sketch used for
    /// admission decisions.
    pub fn get(&self, id: &str) -> Option<String> {
        match self.entries.get(id) {
            Some(payload) => {
                trace!(id = id, "Local tier HIT");
                Some(payload)
            }
            None => {
                trace!(id = id, "Local tier MISS");
                None
            }
        }
    }

    /// Insert or replace a payload
    pub fn insert(&self, id: &str, payload: String) {
        self.entries.insert(id.to_string(), payload);
        debug!(id = id, "Cached payload locally");
    }

    /// Check residency without touching usage statistics
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Drop every local entry
    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
        debug!("Cleared local tier");
    }

    /// Apply pending admissions and evictions now
    pub fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks();
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

impl Default for LocalTier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_hit_miss() {
        let tier = LocalTier::new();

        assert!(tier.get("abc").is_none());
        tier.insert("abc", "payload".to_string());
        assert_eq!(tier.get("abc").as_deref(), Some("payload"));
        assert!(tier.get("other").is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let tier = LocalTier::new();
        tier.insert("abc", "old".to_string());
        tier.insert("abc", "new".to_string());
        assert_eq!(tier.get("abc").as_deref(), Some("new"));
    }

    #[test]
    fn test_clear() {
        let tier = LocalTier::new();
        tier.insert("a", "1".to_string());
        tier.insert("b", "2".to_string());

        tier.clear();

        assert!(tier.get("a").is_none());
        assert!(tier.get("b").is_none());
        assert_eq!(tier.entry_count(), 0);
    }

    #[test]
    fn test_capacity_bound_keeps_hot_entries() {
        let tier = LocalTier::with_limits(4, Duration::from_secs(60));

        for id in ["a", "b", "c", "d"] {
            tier.insert(id, id.to_uppercase());
        }
        tier.run_pending_tasks();

        // "a" is never read again; the others are read on every round
        for _ in 0..5 {
            for id in ["b", "c", "d"] {
                assert!(tier.get(id).is_some());
            }
        }
        tier.run_pending_tasks();

        tier.insert("e", "E".to_string());
        for _ in 0..5 {
            tier.get("e");
        }
        tier.run_pending_tasks();

        assert!(tier.entry_count() <= 4);
        for id in ["b", "c", "d"] {
            assert!(tier.contains(id), "hot entry {id} was evicted");
        }
        // "a" was the least used resident, so it gave up its slot to "e"
        assert!(!tier.contains("a"));
        assert!(tier.contains("e"));
    }

    #[test]
    fn test_least_used_key_loses_when_capacity_exceeded() {
        let tier = LocalTier::with_limits(4, Duration::from_secs(60));
        let ids = ["k0", "k1", "k2", "k3", "k4"];

        // After each insertion, read every key inserted so far once
        for (n, id) in ids.iter().enumerate() {
            tier.insert(id, id.to_uppercase());
            for earlier in &ids[..=n] {
                assert!(tier.get(earlier).is_some());
            }
            tier.run_pending_tasks();
        }

        assert_eq!(tier.entry_count(), 4);
        for id in &ids[..4] {
            assert!(tier.contains(id), "{id} was read more often than k4");
        }
        assert!(!tier.contains("k4"));
    }

    #[test]
    fn test_retention_window_expires_entries() {
        let tier = LocalTier::with_limits(10, Duration::from_millis(50));
        tier.insert("abc", "payload".to_string());
        std::thread::sleep(Duration::from_millis(120));
        assert!(tier.get("abc").is_none());
    }
}
