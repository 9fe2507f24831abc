//! Origin fetches.
//!
//! The proxy performs exactly one GET per origin resource: no retries, no
//! caching, no content inspection. Retry policy belongs to the player (it
//! already re-requests manifests on its own schedule) and caching belongs
//! to the segment cache.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{ProxyError, Result};

/// An origin response reduced to what the proxy needs.
#[derive(Debug, Clone)]
pub struct OriginResponse {
    pub status: u16,
    /// Value of the `Content-Type` header, if the origin sent one.
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl OriginResponse {
    /// Reject non-success statuses and empty bodies.
    ///
    /// An empty 2xx manifest or segment is as unusable to the player as an
    /// error page, so both fail the same way.
    pub fn ensure_success(self) -> Result<Self> {
        if !(200..300).contains(&self.status) {
            return Err(ProxyError::OriginStatus(self.status));
        }
        if self.body.is_empty() {
            return Err(ProxyError::OriginEmptyBody);
        }
        Ok(self)
    }
}

/// A client able to fetch manifests and segments from the real origin.
///
/// The trait seam lets handler tests substitute canned responses for the
/// network.
#[async_trait]
pub trait OriginClient: Send + Sync {
    /// Fetch `url` from the origin.
    ///
    /// Transport failures (DNS, connect, TLS, disconnect mid-body) surface
    /// as errors; any HTTP status comes back as a response.
    async fn fetch(&self, url: &Url) -> Result<OriginResponse>;
}

/// [`OriginClient`] backed by a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct HttpOriginClient {
    client: reqwest::Client,
}

impl HttpOriginClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

impl Default for HttpOriginClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OriginClient for HttpOriginClient {
    async fn fetch(&self, url: &Url) -> Result<OriginResponse> {
        debug!("Fetching {} from origin", url);
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        Ok(OriginResponse {
            status,
            content_type,
            body,
        })
    }
}
