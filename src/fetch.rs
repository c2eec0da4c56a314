//! Upstream HTTP fetcher
//!
//! Performs the actual network call to an upstream sensor endpoint and
//! returns the raw JSON payload. Fetching is kept behind the `Fetcher`
//! trait so the cache store and the HTTP layer can be exercised in tests
//! without network access. A failed fetch surfaces immediately; there is
//! no retry and no fallback logic at this layer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while fetching from an upstream
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport failure, timeout, or a response body that is not JSON
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status code
    #[error("upstream returned {status} for {url}")]
    Status { status: StatusCode, url: String },
}

/// Port for fetching a raw JSON payload from an upstream URL
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Value, FetchError>;
}

/// Production fetcher backed by a shared reqwest client
///
/// The client carries an explicit per-request timeout so a stalled
/// upstream bounds worst-case request latency instead of inheriting
/// whatever the HTTP library defaults to.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                url: url.to_string(),
            });
        }

        Ok(response.json::<Value>().await?)
    }
}
