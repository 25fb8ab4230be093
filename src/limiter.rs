//! Outbound Rate Limiter
//!
//! Process-wide bound on origin requests. A GCRA quota (one permit per
//! interval, optional burst) does the accounting; a fair async mutex in front
//! of it queues waiters so permits are handed out in arrival order.

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as GcraLimiter};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::upstream::ResolveError;

/// Proof that one rate-limited operation may proceed
#[derive(Debug)]
pub struct Permit {
    /// Time spent queued before the permit was granted
    pub waited: Duration,
}

/// Rate limiter for outbound fetches
pub struct RateLimiter {
    /// GCRA state
    quota: DefaultDirectRateLimiter,
    /// FIFO queue of waiters; the holder is the next in line
    turn: Mutex<()>,
    interval: Duration,
    burst: NonZeroU32,
}

impl RateLimiter {
    /// Create a limiter granting one permit per `interval` with up to `burst`
    /// permits available at once
    pub fn new(interval: Duration, burst: NonZeroU32) -> Result<Self> {
        let quota = Quota::with_period(interval)
            .ok_or_else(|| anyhow!("Rate limit interval must be non-zero"))?
            .allow_burst(burst);

        Ok(Self {
            quota: GcraLimiter::direct(quota),
            turn: Mutex::new(()),
            interval,
            burst,
        })
    }

    /// Wait for the next permit
    ///
    /// Returns immediately when a permit is available. Fails with
    /// [`ResolveError::Cancelled`] only if `cancel` fires first, in which case
    /// no permit is consumed.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Permit, ResolveError> {
        let started = Instant::now();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(waited_ms = started.elapsed().as_millis() as u64, "Permit wait cancelled");
                Err(ResolveError::Cancelled)
            }
            _ = self.next_in_line() => {
                let waited = started.elapsed();
                trace!(waited_ms = waited.as_millis() as u64, "Permit granted");
                Ok(Permit { waited })
            }
        }
    }

    async fn next_in_line(&self) {
        let _turn = self.turn.lock().await;
        self.quota.until_ready().await;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn burst(&self) -> u32 {
        self.burst.get()
    }
}
