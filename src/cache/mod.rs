//! Payload caching layer
//!
//! Two tiers: a bounded in-process Moka cache answering most reads without a
//! network hop, backed by a shared TTL store (Redis, or memory when running
//! standalone) so instances reuse each other's fetches.

pub mod local;
pub mod redis_tier;
pub mod shared;
pub mod tiered;

pub use local::LocalTier;
pub use redis_tier::RedisTier;
pub use shared::{MemoryTier, SharedTier, TierError};
pub use tiered::{CacheLookup, CacheStats, TieredCache, WriteOutcome};
