use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::FetchError;

/// Default per-request timeout for tile fetches.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Trait for fetching raw tile bytes from a URL.
///
/// This abstraction lets the request controller work against HTTP in
/// production and against in-memory doubles in tests. Implementations must be
/// thread-safe since fetches run on spawned tasks.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Fetch the body at `url`.
    ///
    /// Dropping the returned future must abandon the request.
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// reqwest-backed implementation of [`ImageFetcher`].
#[derive(Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    /// Create a fetcher with the default timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))
    }

    /// Create a fetcher with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("raster-tile-source/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Wrap an existing client (shared connection pool).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Map a reqwest error onto [`FetchError`].
pub(crate) fn map_reqwest_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(url.to_string())
    } else if err.is_builder() {
        FetchError::InvalidUrl(format!("{}: {}", url, err))
    } else if let Some(status) = err.status() {
        FetchError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        }
    } else {
        FetchError::Connection(err.to_string())
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response.bytes().await.map_err(|e| map_reqwest_error(url, e))
    }
}
