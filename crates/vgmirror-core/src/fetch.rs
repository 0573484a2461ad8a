//! Upstream retrieval of the raw server list.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;

use crate::error::{Error, Result};

/// Default request timeout for one upstream fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default upper bound on the upstream body size (64 MiB).
pub const DEFAULT_MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

/// A source of raw upstream documents.
///
/// One call is one retrieval; retry and scheduling belong to the refresher.
pub trait Fetch: Send + Sync + 'static {
    /// Retrieve the current raw document.
    fn fetch(&self) -> impl Future<Output = Result<Bytes>> + Send;
}

/// Settings for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Upstream URL.
    pub url: String,
    /// Whole-request timeout (connect + headers + body).
    pub timeout: Duration,
    /// Bodies larger than this are rejected.
    pub max_body_bytes: u64,
}

impl FetchConfig {
    /// Config for `url` with default timeout and size limit.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Fetches the document with a plain HTTP GET.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Build a fetcher with its own connection pool.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("vgmirror/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    /// The upstream URL this fetcher targets.
    pub fn url(&self) -> &str {
        &self.config.url
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self) -> Result<Bytes> {
        tracing::debug!(url = %self.config.url, "starting download");

        let resp = self.client.get(&self.config.url).send().await?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(Error::Status(status.as_u16()));
        }

        let limit = self.config.max_body_bytes;
        if let Some(size) = resp.content_length().filter(|&size| size > limit) {
            return Err(Error::BodyTooLarge { size, limit });
        }

        // Content-Length may be absent (chunked), so check again after reading.
        let body = resp.bytes().await?;
        let size = body.len() as u64;
        if size > limit {
            return Err(Error::BodyTooLarge { size, limit });
        }

        tracing::debug!(url = %self.config.url, bytes = size, "download finished");
        Ok(body)
    }
}
