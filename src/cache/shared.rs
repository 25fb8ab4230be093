//! Shared Tier Interface
//!
//! The out-of-process key-value store shared by every daemon instance.
//! Entries expire on their own after the TTL given at write time.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::trace;

/// Default lifetime of a shared-tier entry
pub const DEFAULT_SHARED_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default bound on a single shared-tier round trip
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_millis(500);

/// Shared tier failure. Never leaves the cache layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TierError {
    #[error("Shared tier unavailable: {0}")]
    Unavailable(String),

    #[error("Shared tier operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Shared tier command failed: {0}")]
    Command(String),
}

/// Out-of-process key-value store with per-entry expiry
#[async_trait]
pub trait SharedTier: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, TierError>;

    async fn get(&self, key: &str) -> Result<Option<String>, TierError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TierError>;

    /// Short backend name for logs and health output
    fn name(&self) -> &'static str;
}

/// In-process stand-in for the shared tier
///
/// Runs on the tokio clock so paused-time tests can step past a TTL.
/// Used when no Redis URL is configured.
#[derive(Default)]
pub struct MemoryTier {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until next purge
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Some(value.clone()),
            Some(_) => {
                trace!(key = key, "Shared entry expired");
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl SharedTier for MemoryTier {
    async fn exists(&self, key: &str) -> Result<bool, TierError> {
        Ok(self.live_value(key).is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TierError> {
        Ok(self.live_value(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TierError> {
        let now = Instant::now();
        let mut entries = self.lock();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Shared tier that fails every call, for degradation tests
#[cfg(test)]
pub(crate) struct FailingTier;

#[cfg(test)]
#[async_trait]
impl SharedTier for FailingTier {
    async fn exists(&self, _key: &str) -> Result<bool, TierError> {
        Err(TierError::Unavailable("connection refused".to_string()))
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, TierError> {
        Err(TierError::Unavailable("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), TierError> {
        Err(TierError::Unavailable("connection refused".to_string()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}
