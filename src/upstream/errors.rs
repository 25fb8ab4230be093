//! Resolve Error Types
//!
//! Structured error handling for the fetch path.
//! Only these failures ever reach the caller of `resolve`; shared cache tier
//! faults are absorbed inside the cache layer.

/// Transport-level failure reported by a [`Fetcher`](super::Fetcher)
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Errors surfaced by `FetchOrchestrator::resolve`
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("Cancelled while waiting for a rate limit permit")]
    Cancelled,

    #[error("Network error: {0}")]
    Network(#[from] FetchError),

    #[error("Upstream responded with status {code}")]
    UpstreamStatus { code: u16 },
}

impl ResolveError {
    /// Map a resolve error to the HTTP status the dispatch layer answers with
    ///
    /// Upstream statuses are passed through; pure transport failures become
    /// 502 and an abandoned permit wait becomes 503.
    pub fn to_status(&self) -> u16 {
        match self {
            ResolveError::Cancelled => 503,
            ResolveError::Network(_) => 502,
            ResolveError::UpstreamStatus { code } => *code,
        }
    }

    /// Create an error from a non-success origin status
    pub fn from_status(status: u16) -> Self {
        ResolveError::UpstreamStatus { code: status }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_upstream_status_passes_through() {
        assert_eq!(ResolveError::from_status(404).to_status(), 404);
        assert_eq!(ResolveError::from_status(429).to_status(), 429);
    }

    #[test]
    fn test_transport_and_cancel_statuses() {
        let err: ResolveError = FetchError::Timeout(Duration::from_secs(10)).into();
        assert_eq!(err.to_status(), 502);
        assert_eq!(ResolveError::Cancelled.to_status(), 503);
    }

    #[test]
    fn test_error_text_carries_cause() {
        let err: ResolveError = FetchError::Connect("refused".to_string()).into();
        assert!(err.to_string().contains("refused"));
        assert!(ResolveError::from_status(500).to_string().contains("500"));
    }
}
