//! Redis-backed shared tier

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, RedisResult};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::shared::{SharedTier, TierError};

/// Shared tier stored in Redis
///
/// Connects lazily: a Redis outage at startup only degrades the cache, and
/// the next operation retries the connection.
pub struct RedisTier {
    client: redis::Client,
    /// Multiplexed connection, reconnects on its own once established
    conn: OnceCell<ConnectionManager>,
    /// Bound on each round trip, connection setup included
    op_timeout: Duration,
}

impl RedisTier {
    /// Create a tier for the given `redis://` URL without connecting yet
    pub fn open(url: &str, op_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)
            .with_context(|| format!("Invalid Redis URL: {}", url))?;

        info!(url = url, "Redis shared tier configured");
        Ok(Self {
            client,
            conn: OnceCell::new(),
            op_timeout,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, TierError> {
        let conn = self
            .bounded(self.conn.get_or_try_init(|| async {
                debug!("Connecting to Redis");
                ConnectionManager::new(self.client.clone()).await
            }))
            .await?;
        Ok(conn.clone())
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, TierError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        tokio::time::timeout(self.op_timeout, op)
            .await
            .map_err(|_| TierError::Timeout(self.op_timeout))?
            .map_err(|e| classify(e, self.op_timeout))
    }
}

/// Map a client error onto the tier error kinds
fn classify(e: RedisError, op_timeout: Duration) -> TierError {
    if e.is_timeout() {
        TierError::Timeout(op_timeout)
    } else if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
        TierError::Unavailable(e.to_string())
    } else {
        TierError::Command(e.to_string())
    }
}

#[async_trait]
impl SharedTier for RedisTier {
    async fn exists(&self, key: &str) -> Result<bool, TierError> {
        let mut conn = self.connection().await?;
        self.bounded(conn.exists(key)).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TierError> {
        let mut conn = self.connection().await?;
        self.bounded(conn.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TierError> {
        let mut conn = self.connection().await?;
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        self.bounded(conn.pset_ex(key, value, millis)).await
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_url() {
        assert!(RedisTier::open("not a url", Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_client_timeout_reports_configured_bound() {
        let op_timeout = Duration::from_millis(250);
        let err = RedisError::from(std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out"));

        match classify(err, op_timeout) {
            TierError::Timeout(reported) => assert_eq!(reported, op_timeout),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_refused_connection_is_unavailable() {
        let err = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(matches!(
            classify(err, Duration::from_millis(250)),
            TierError::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_tier_error() {
        let tier = RedisTier::open("redis://127.0.0.1:1/", Duration::from_millis(500)).unwrap();

        assert!(tier.get("abc").await.is_err());
        assert!(tier.set("abc", "v", Duration::from_secs(1)).await.is_err());
    }
}
