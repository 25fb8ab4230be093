//! Test doubles shared by unit tests across modules

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;

use crate::upstream::{FetchError, FetchResponse, Fetcher};

/// Canned origin that counts calls and records the last request
pub struct StubFetcher {
    reply: Result<FetchResponse, FetchError>,
    delay: Duration,
    calls: AtomicUsize,
    pub last_request: Mutex<Option<(String, HeaderMap)>>,
}

impl StubFetcher {
    pub fn new(reply: Result<FetchResponse, FetchError>) -> Arc<Self> {
        Self::with_delay(reply, Duration::ZERO)
    }

    pub fn with_delay(reply: Result<FetchResponse, FetchError>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply,
            delay,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<FetchResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some((url.to_string(), headers.clone()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone()
    }
}

/// A 200 page carrying `payload` the way the origin embeds it
pub fn page(payload: &str) -> Result<FetchResponse, FetchError> {
    let body = format!(
        r#"<html><script type="text/javascript">window._sharedData = {};</script></html>"#,
        payload
    );
    Ok(FetchResponse {
        status: 200,
        body: Bytes::from(body),
    })
}

/// A bodiless response with the given status
pub fn status(code: u16) -> Result<FetchResponse, FetchError> {
    Ok(FetchResponse {
        status: code,
        body: Bytes::new(),
    })
}
