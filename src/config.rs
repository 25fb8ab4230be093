//! Runtime configuration for postcache.
//!
//! Loaded from a JSON file (path from `CONFIG_PATH`, default `./config.json`);
//! every field has a default, so a missing file or a partial file is fine.
//! `REDIS_URL` and `LISTEN_ADDR` override the file.

use std::env;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Config file used when `CONFIG_PATH` is unset
pub const DEFAULT_CONFIG_PATH: &str = "./config.json";

/// Browser identification sent with every origin request
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/90.0.4430.212 Safari/537.36";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub fetch: FetchConfig,
    pub limiter: LimiterConfig,
    pub cache: CacheConfig,
    /// Shared tier connection; `None` keeps the shared tier in process
    pub redis: Option<RedisConfig>,
}

/// HTTP dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,

    /// Longest a request may queue for a rate limit permit.
    pub permit_wait_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            permit_wait_timeout_secs: 30,
        }
    }
}

/// Origin request settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Prefix the identifier is appended to.
    pub base_url: String,

    pub user_agent: String,

    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://instagram.com/p/".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 10,
        }
    }
}

/// Outbound rate limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// One permit is replenished per interval.
    pub interval_ms: u64,

    /// Permits available at once.
    pub burst: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            burst: 1,
        }
    }
}

/// Cache tier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Max entries in the in-process tier.
    pub local_capacity: u64,

    /// How long an entry may stay in the in-process tier.
    pub local_retention_secs: u64,

    /// Expiry of shared-tier entries.
    pub shared_ttl_secs: u64,

    /// Bound on one shared-tier round trip.
    pub shared_op_timeout_ms: u64,

    /// Whether a page with no extractable payload is cached as "".
    pub cache_empty_payloads: bool,

    /// Let concurrent misses for one identifier share a single fetch.
    pub coalesce_requests: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_capacity: 1000,
            local_retention_secs: 60,
            shared_ttl_secs: 24 * 60 * 60,
            shared_op_timeout_ms: 500,
            cache_empty_payloads: true,
            coalesce_requests: true,
        }
    }
}

/// Redis connection for the shared tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// e.g. "redis://:password@localhost:6379/0"
    pub url: String,
}

impl Config {
    /// Load configuration from `CONFIG_PATH` (or the default path) and the
    /// process environment
    pub fn load() -> Result<Self> {
        let path = env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file; a missing file yields the defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Apply `REDIS_URL` / `LISTEN_ADDR` overrides from `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("REDIS_URL").filter(|u| !u.is_empty()) {
            self.redis = Some(RedisConfig { url });
        }
        if let Some(listen) = lookup("LISTEN_ADDR").filter(|l| !l.is_empty()) {
            self.server.listen = listen;
        }
    }

    /// Reject settings the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.limiter.interval_ms == 0 {
            bail!("limiter.interval_ms must be greater than zero");
        }
        if self.limiter.burst == 0 {
            bail!("limiter.burst must be greater than zero");
        }
        if self.cache.local_capacity == 0 {
            bail!("cache.local_capacity must be greater than zero");
        }
        if self.cache.shared_ttl_secs == 0 {
            bail!("cache.shared_ttl_secs must be greater than zero");
        }
        if self.cache.shared_op_timeout_ms == 0 {
            bail!("cache.shared_op_timeout_ms must be greater than zero");
        }
        if self.fetch.timeout_secs == 0 {
            bail!("fetch.timeout_secs must be greater than zero");
        }
        if self.server.permit_wait_timeout_secs == 0 {
            bail!("server.permit_wait_timeout_secs must be greater than zero");
        }
        if self.cache.local_retention_secs > self.cache.shared_ttl_secs {
            bail!(
                "cache.local_retention_secs ({}) exceeds cache.shared_ttl_secs ({})",
                self.cache.local_retention_secs,
                self.cache.shared_ttl_secs
            );
        }
        reqwest::Url::parse(&self.fetch.base_url)
            .with_context(|| format!("Invalid fetch.base_url: {}", self.fetch.base_url))?;
        reqwest::header::HeaderValue::from_str(&self.fetch.user_agent)
            .map_err(|_| anyhow!("fetch.user_agent is not a valid header value"))?;
        Ok(())
    }

    pub fn limiter_interval(&self) -> Duration {
        Duration::from_millis(self.limiter.interval_ms)
    }

    pub fn limiter_burst(&self) -> NonZeroU32 {
        NonZeroU32::new(self.limiter.burst).unwrap_or(NonZeroU32::MIN)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    pub fn local_retention(&self) -> Duration {
        Duration::from_secs(self.cache.local_retention_secs)
    }

    pub fn shared_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.shared_ttl_secs)
    }

    pub fn shared_op_timeout(&self) -> Duration {
        Duration::from_millis(self.cache.shared_op_timeout_ms)
    }

    pub fn permit_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.server.permit_wait_timeout_secs)
    }
}
