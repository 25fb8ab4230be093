//! Fetch-through resolution
//!
//! `FetchOrchestrator::resolve` is the single entry point: answer from the
//! cache when possible, otherwise take a rate limit permit, fetch the page,
//! extract the payload and populate both cache tiers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheLookup, TieredCache, WriteOutcome};
use crate::config::{Config, DEFAULT_USER_AGENT};
use crate::limiter::RateLimiter;
use crate::upstream::{Extractor, Fetcher, ResolveError};

/// Resolve behaviour knobs
#[derive(Debug, Clone)]
pub struct ResolveSettings {
    /// Prefix the identifier is appended to verbatim
    pub base_url: String,
    pub user_agent: String,
    /// Cache "" when the page carries no payload
    pub cache_empty_payloads: bool,
    /// Share one fetch between concurrent misses for the same identifier
    pub coalesce_requests: bool,
}

impl Default for ResolveSettings {
    fn default() -> Self {
        Self {
            base_url: "https://instagram.com/p/".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cache_empty_payloads: true,
            coalesce_requests: true,
        }
    }
}

impl From<&Config> for ResolveSettings {
    fn from(config: &Config) -> Self {
        Self {
            base_url: config.fetch.base_url.clone(),
            user_agent: config.fetch.user_agent.clone(),
            cache_empty_payloads: config.cache.cache_empty_payloads,
            coalesce_requests: config.cache.coalesce_requests,
        }
    }
}

/// Pending fetches keyed by identifier
type InFlight = Mutex<HashMap<String, Arc<OnceCell<String>>>>;

/// Takes an identifier's slot out of the in-flight map once nobody needs it
///
/// The slot goes when its fetch has succeeded or when the last caller
/// waiting on it leaves, including callers whose future was dropped.
struct SlotRelease<'a> {
    in_flight: &'a InFlight,
    id: &'a str,
    slot: Arc<OnceCell<String>>,
}

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        let mut pending = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let Some(current) = pending.get(self.id) else {
            return;
        };
        if !Arc::ptr_eq(current, &self.slot) {
            return;
        }
        // One reference in the map, one here: no other caller is waiting
        if self.slot.initialized() || Arc::strong_count(&self.slot) <= 2 {
            pending.remove(self.id);
        }
    }
}

/// Cache-first resolver with rate-limited origin fetches
pub struct FetchOrchestrator {
    /// Owned outright; every origin request in this process goes through it
    limiter: RateLimiter,
    cache: Arc<TieredCache>,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn Extractor>,
    base_url: String,
    /// Fixed outbound headers (user agent)
    headers: HeaderMap,
    cache_empty_payloads: bool,
    /// Present when request coalescing is enabled
    in_flight: Option<InFlight>,
    /// Origin fetches attempted
    fetches: AtomicU64,
}

impl FetchOrchestrator {
    pub fn new(
        limiter: RateLimiter,
        cache: Arc<TieredCache>,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn Extractor>,
        settings: ResolveSettings,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&settings.user_agent).context("Invalid user agent")?,
        );

        info!(
            base_url = %settings.base_url,
            interval_ms = limiter.interval().as_millis() as u64,
            burst = limiter.burst(),
            coalesce = settings.coalesce_requests,
            "Fetch orchestrator ready"
        );

        Ok(Self {
            limiter,
            cache,
            fetcher,
            extractor,
            base_url: settings.base_url,
            headers,
            cache_empty_payloads: settings.cache_empty_payloads,
            in_flight: settings.coalesce_requests.then(|| Mutex::new(HashMap::new())),
            fetches: AtomicU64::new(0),
        })
    }

    /// Resolve a payload with no caller-side cancellation
    pub async fn resolve(&self, id: &str) -> Result<String, ResolveError> {
        self.resolve_with_cancel(id, &CancellationToken::new()).await
    }

    /// Resolve a payload, giving up the permit wait when `cancel` fires
    pub async fn resolve_with_cancel(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ResolveError> {
        match self.cache.lookup(id).await {
            CacheLookup::Local(payload) => {
                info!(id = id, tier = "local", "Cache hit");
                return Ok(payload);
            }
            CacheLookup::Shared(payload) => {
                info!(id = id, tier = "shared", "Cache hit");
                return Ok(payload);
            }
            CacheLookup::Miss { degraded } => {
                info!(id = id, degraded = degraded.is_some(), "Cache miss");
            }
        }

        match &self.in_flight {
            Some(in_flight) => self.resolve_shared(in_flight, id, cancel).await,
            None => self.fetch_and_store(id, cancel).await,
        }
    }

    /// Join (or start) the in-flight fetch for `id`
    ///
    /// A failed attempt is not shared: the next waiter in line runs its own.
    async fn resolve_shared(
        &self,
        in_flight: &InFlight,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ResolveError> {
        // Released on return and when this future is dropped mid-wait
        let release = SlotRelease {
            in_flight,
            id,
            slot: {
                let mut pending = in_flight.lock().unwrap_or_else(|e| e.into_inner());
                Arc::clone(pending.entry(id.to_string()).or_default())
            },
        };

        let result = release
            .slot
            .get_or_try_init(|| self.fetch_and_store(id, cancel))
            .await
            .cloned();
        result
    }

    async fn fetch_and_store(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ResolveError> {
        let permit = self.limiter.acquire(cancel).await?;

        let url = format!("{}{}", self.base_url, id);
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let response = self
            .fetcher
            .fetch(&url, &self.headers)
            .await
            .map_err(|e| {
                error!(id = id, url = %url, error = %e, "Origin fetch failed");
                ResolveError::from(e)
            })?;

        if !response.is_success() {
            warn!(id = id, status = response.status, "Origin returned non-success status");
            return Err(ResolveError::from_status(response.status));
        }

        let payload = self.extractor.extract(&response.body);
        if payload.is_empty() {
            warn!(id = id, size = response.body.len(), "No payload found in document");
            if !self.cache_empty_payloads {
                return Ok(payload);
            }
        }

        if let WriteOutcome::LocalOnly(_) = self.cache.set(id, &payload).await {
            debug!(id = id, "Payload cached in local tier only");
        }

        info!(
            id = id,
            waited_ms = permit.waited.as_millis() as u64,
            size = payload.len(),
            "Fetched from origin"
        );
        Ok(payload)
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    /// Number of origin fetches attempted so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}
