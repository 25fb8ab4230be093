//! postcache - rate-limited fetch-through cache
//!
//! Resolves an identifier to a payload extracted from an origin page, caching
//! results in a local Moka tier and a shared Redis tier, and spacing origin
//! requests through a single process-wide rate limiter.

pub mod cache;
pub mod config;
pub mod limiter;
pub mod orchestrator;
pub mod server;
pub mod upstream;

#[cfg(test)]
mod testing;

pub use cache::{CacheLookup, TieredCache, WriteOutcome};
pub use config::Config;
pub use limiter::{Permit, RateLimiter};
pub use orchestrator::{FetchOrchestrator, ResolveSettings};
pub use upstream::{Extractor, Fetcher, ResolveError};
