//! JSON bodies served by the dispatch layer

use serde::Serialize;

use crate::cache::CacheStats;

/// Content type of a resolved payload
pub const PAYLOAD_CONTENT_TYPE: &str = "application/json";

/// Response for `GET /health`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always "ok" while the process serves requests
    pub status: &'static str,
    pub shared_tier: SharedTierInfo,
    pub cache: CacheStats,
    /// Origin fetches attempted since start
    pub fetches: u64,
    pub uptime_secs: u64,
}

/// Shared tier backend and its last observed state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedTierInfo {
    pub backend: String,
    pub health: String,
}
