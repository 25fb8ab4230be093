//! Two-tier payload cache
//!
//! Reads go local tier first, then the shared tier; writes go to both.
//! Shared-tier faults are absorbed here: a failed read is a miss and a failed
//! write leaves the fresh value in the local tier only. Both cases are
//! reported through the returned outcome, a log event and the counters.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, trace, warn};

use super::local::LocalTier;
use super::shared::{SharedTier, TierError};

/// Shared tier health values
pub const HEALTH_HEALTHY: u8 = 0;
pub const HEALTH_DEGRADED: u8 = 1;

/// Result of a cache lookup, with the tier that answered
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Local(String),
    Shared(String),
    /// Nothing cached; `degraded` holds the shared-tier fault if the shared
    /// tier could not be consulted
    Miss { degraded: Option<TierError> },
}

impl CacheLookup {
    pub fn into_payload(self) -> Option<String> {
        match self {
            CacheLookup::Local(payload) | CacheLookup::Shared(payload) => Some(payload),
            CacheLookup::Miss { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, CacheLookup::Miss { degraded: Some(_) })
    }
}

/// Result of a cache write
#[derive(Debug, Clone)]
pub enum WriteOutcome {
    /// Written to both tiers
    Stored,
    /// The shared tier rejected the write; only this process sees the value
    LocalOnly(TierError),
}

/// Counter snapshot
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub local_hits: u64,
    pub shared_hits: u64,
    pub misses: u64,
    pub degraded_reads: u64,
    pub degraded_writes: u64,
    pub local_entries: u64,
}

impl CacheStats {
    /// Percentage of lookups answered by either tier
    pub fn hit_rate(&self) -> f64 {
        let hits = self.local_hits + self.shared_hits;
        let total = hits + self.misses;
        if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Local tier in front of a shared tier
pub struct TieredCache {
    local: LocalTier,
    shared: Arc<dyn SharedTier>,
    /// Expiry applied to every shared-tier write
    shared_ttl: Duration,
    local_hits: AtomicU64,
    shared_hits: AtomicU64,
    misses: AtomicU64,
    degraded_reads: AtomicU64,
    degraded_writes: AtomicU64,
    /// Outcome of the most recent shared-tier call
    health: AtomicU8,
}

impl TieredCache {
    pub fn new(local: LocalTier, shared: Arc<dyn SharedTier>, shared_ttl: Duration) -> Self {
        Self {
            local,
            shared,
            shared_ttl,
            local_hits: AtomicU64::new(0),
            shared_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            degraded_reads: AtomicU64::new(0),
            degraded_writes: AtomicU64::new(0),
            health: AtomicU8::new(HEALTH_HEALTHY),
        }
    }

    /// Look up a payload, reporting which tier answered
    ///
    /// A shared-tier hit is copied into the local tier with the full local
    /// retention, so it can outlive the shared copy by up to that window.
    pub async fn lookup(&self, id: &str) -> CacheLookup {
        if let Some(payload) = self.local.get(id) {
            self.local_hits.fetch_add(1, Ordering::Relaxed);
            debug!(id = id, "Cache HIT (local)");
            return CacheLookup::Local(payload);
        }

        match self.read_shared(id).await {
            Ok(Some(payload)) => {
                self.mark_healthy();
                self.shared_hits.fetch_add(1, Ordering::Relaxed);
                self.local.insert(id, payload.clone());
                debug!(id = id, "Cache HIT (shared)");
                CacheLookup::Shared(payload)
            }
            Ok(None) => {
                self.mark_healthy();
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(id = id, "Cache MISS");
                CacheLookup::Miss { degraded: None }
            }
            Err(e) => {
                self.health.store(HEALTH_DEGRADED, Ordering::Relaxed);
                self.degraded_reads.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                warn!(
                    id = id,
                    tier = self.shared.name(),
                    error = %e,
                    "Shared tier read failed, treating as miss"
                );
                CacheLookup::Miss { degraded: Some(e) }
            }
        }
    }

    /// Look up a payload; shared-tier faults read as a miss
    pub async fn get(&self, id: &str) -> Option<String> {
        self.lookup(id).await.into_payload()
    }

    async fn read_shared(&self, id: &str) -> Result<Option<String>, TierError> {
        if !self.shared.exists(id).await? {
            return Ok(None);
        }
        // Entry may expire between the two calls; that is an ordinary miss
        self.shared.get(id).await
    }

    /// Store a payload in both tiers
    pub async fn set(&self, id: &str, payload: &str) -> WriteOutcome {
        self.local.insert(id, payload.to_string());

        match self.shared.set(id, payload, self.shared_ttl).await {
            Ok(()) => {
                self.mark_healthy();
                trace!(id = id, ttl_secs = self.shared_ttl.as_secs(), "Stored in shared tier");
                WriteOutcome::Stored
            }
            Err(e) => {
                self.health.store(HEALTH_DEGRADED, Ordering::Relaxed);
                self.degraded_writes.fetch_add(1, Ordering::Relaxed);
                warn!(
                    id = id,
                    tier = self.shared.name(),
                    error = %e,
                    "Shared tier write failed, value kept locally only"
                );
                WriteOutcome::LocalOnly(e)
            }
        }
    }

    fn mark_healthy(&self) {
        self.health.store(HEALTH_HEALTHY, Ordering::Relaxed);
    }

    /// Drop the local tier, leaving the shared tier untouched
    pub fn clear_local(&self) {
        self.local.clear();
    }

    pub fn local(&self) -> &LocalTier {
        &self.local
    }

    /// Shared tier health string
    pub fn health_status(&self) -> &'static str {
        match self.health.load(Ordering::Relaxed) {
            HEALTH_HEALTHY => "healthy",
            _ => "degraded",
        }
    }

    pub fn shared_tier_name(&self) -> &'static str {
        self.shared.name()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            local_hits: self.local_hits.load(Ordering::Relaxed),
            shared_hits: self.shared_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            degraded_reads: self.degraded_reads.load(Ordering::Relaxed),
            degraded_writes: self.degraded_writes.load(Ordering::Relaxed),
            local_entries: self.local.entry_count(),
        }
    }

    /// Log current cache metrics
    pub fn log_metrics(&self) {
        let stats = self.stats();
        debug!(
            local_hits = stats.local_hits,
            shared_hits = stats.shared_hits,
            misses = stats.misses,
            hit_rate = format!("{:.1}%", stats.hit_rate()),
            degraded_reads = stats.degraded_reads,
            degraded_writes = stats.degraded_writes,
            local_entries = stats.local_entries,
            shared_tier = self.health_status(),
            "Cache metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::shared::{FailingTier, MemoryTier, DEFAULT_SHARED_TTL};

    fn memory_cache(ttl: Duration) -> (TieredCache, Arc<MemoryTier>) {
        let shared = Arc::new(MemoryTier::new());
        let cache = TieredCache::new(LocalTier::new(), shared.clone(), ttl);
        (cache, shared)
    }

    #[tokio::test]
    async fn test_set_writes_both_tiers() {
        let (cache, shared) = memory_cache(Duration::from_secs(60));

        assert!(matches!(cache.set("abc", "XYZ").await, WriteOutcome::Stored));
        assert!(cache.local().contains("abc"));
        assert_eq!(shared.get("abc").await.unwrap().as_deref(), Some("XYZ"));
    }

    #[tokio::test]
    async fn test_lookup_order_local_then_shared() {
        let (cache, _shared) = memory_cache(Duration::from_secs(60));
        cache.set("abc", "XYZ").await;

        assert!(matches!(cache.lookup("abc").await, CacheLookup::Local(p) if p == "XYZ"));

        cache.clear_local();
        assert!(matches!(cache.lookup("abc").await, CacheLookup::Shared(p) if p == "XYZ"));

        // Shared hit repopulated the local tier
        assert!(matches!(cache.lookup("abc").await, CacheLookup::Local(_)));

        let stats = cache.stats();
        assert_eq!(stats.local_hits, 2);
        assert_eq!(stats.shared_hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn test_both_tiers_miss() {
        let (cache, _shared) = memory_cache(Duration::from_secs(60));
        let lookup = cache.lookup("nope").await;

        assert!(matches!(lookup, CacheLookup::Miss { degraded: None }));
        assert!(cache.get("nope").await.is_none());
        assert_eq!(cache.stats().misses, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_entry_expires_after_ttl() {
        let (cache, _shared) = memory_cache(Duration::from_secs(1));
        cache.set("abc", "XYZ").await;
        cache.clear_local();

        tokio::time::advance(Duration::from_millis(1500)).await;

        assert!(matches!(cache.lookup("abc").await, CacheLookup::Miss { degraded: None }));
    }

    #[tokio::test]
    async fn test_failing_shared_tier_degrades_to_miss() {
        let cache = TieredCache::new(LocalTier::new(), Arc::new(FailingTier), DEFAULT_SHARED_TTL);

        let lookup = cache.lookup("abc").await;
        assert!(lookup.is_degraded());
        assert!(lookup.into_payload().is_none());
        assert_eq!(cache.health_status(), "degraded");

        let outcome = cache.set("abc", "XYZ").await;
        assert!(matches!(outcome, WriteOutcome::LocalOnly(TierError::Unavailable(_))));

        // The local tier still serves the fresh value
        assert_eq!(cache.get("abc").await.as_deref(), Some("XYZ"));

        let stats = cache.stats();
        assert_eq!(stats.degraded_reads, 1);
        assert_eq!(stats.degraded_writes, 1);
    }

    #[tokio::test]
    async fn test_health_recovers_after_successful_call() {
        let (cache, _shared) = memory_cache(Duration::from_secs(60));
        cache.health.store(HEALTH_DEGRADED, Ordering::Relaxed);

        cache.lookup("abc").await;
        assert_eq!(cache.health_status(), "healthy");
    }
}
