//! Origin HTTP Client
//!
//! Performs the single outbound GET behind every cache miss.
//! The client owns its timeout; rate limiting happens before it is called.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::Client;
use tracing::{debug, warn};

use super::errors::FetchError;

/// Default timeout for one origin request
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw origin response: status plus the undecoded body
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Bytes,
}

impl FetchResponse {
    /// Whether the origin answered with a 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outbound fetch collaborator
///
/// Non-success statuses are returned as responses, not errors. Only failures
/// to reach the origin at all are reported as [`FetchError`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<FetchResponse, FetchError>;
}

/// reqwest-backed fetcher
#[derive(Clone)]
pub struct HttpFetcher {
    /// HTTP client with the request timeout baked in
    http_client: Client,
    /// Request timeout (kept for error reporting)
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            timeout,
        })
    }

    fn classify(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else if e.is_connect() {
            FetchError::Connect(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<FetchResponse, FetchError> {
        debug!(url = url, "Fetching from origin");

        let response = self
            .http_client
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| {
                let err = self.classify(e);
                warn!(url = url, error = %err, "Origin request failed");
                err
            })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| self.classify(e))?;

        debug!(url = url, status = status, size = body.len(), "Origin responded");
        Ok(FetchResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, USER_AGENT};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ua_headers(ua: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(ua).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_fetch_returns_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p/abc123"))
            .and(header("user-agent", "postcache-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>hi</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(DEFAULT_FETCH_TIMEOUT).unwrap();
        let url = format!("{}/p/abc123", server.uri());
        let response = fetcher.fetch(&url, &ua_headers("postcache-test")).await.unwrap();

        assert!(response.is_success());
        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"<html>hi</html>");
    }

    #[tokio::test]
    async fn test_non_success_status_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(DEFAULT_FETCH_TIMEOUT).unwrap();
        let url = format!("{}/p/missing", server.uri());
        let response = fetcher.fetch(&url, &HeaderMap::new()).await.unwrap();

        assert!(!response.is_success());
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_millis(100)).unwrap();
        let url = format!("{}/p/slow", server.uri());
        let err = fetcher.fetch(&url, &HeaderMap::new()).await.unwrap_err();

        assert!(matches!(err, FetchError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_unreachable_origin_is_a_transport_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(2)).unwrap();
        let result = fetcher
            .fetch("http://127.0.0.1:1/p/abc", &HeaderMap::new())
            .await;

        assert!(result.is_err());
    }
}
