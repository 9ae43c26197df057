//! TileJSON loading.
//!
//! A source either lists its tile templates inline or points at a TileJSON
//! document through `url`. In the latter case the document is fetched once,
//! before the first tile is requested, and merged into the descriptor.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::DescriptorError;
use crate::io::{map_reqwest_error, DEFAULT_FETCH_TIMEOUT_SECS};

use super::descriptor::{SourceDescriptor, TileJson};
use super::url::{normalize_source_url, UrlOptions};

/// Trait for fetching TileJSON documents.
#[async_trait]
pub trait DescriptorProvider: Send + Sync {
    /// Fetch and parse the TileJSON document at `url`.
    async fn load(&self, url: &str) -> Result<TileJson, DescriptorError>;
}

/// reqwest-backed implementation of [`DescriptorProvider`].
#[derive(Clone)]
pub struct HttpDescriptorProvider {
    client: reqwest::Client,
}

impl HttpDescriptorProvider {
    /// Create a provider with the default timeout.
    pub fn new() -> Result<Self, DescriptorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| DescriptorError::Parse(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DescriptorProvider for HttpDescriptorProvider {
    async fn load(&self, url: &str) -> Result<TileJson, DescriptorError> {
        let fetch_err = |e: reqwest::Error| DescriptorError::Fetch {
            url: url.to_string(),
            source: map_reqwest_error(url, e),
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(fetch_err)?
            .error_for_status()
            .map_err(fetch_err)?;

        let body = response.bytes().await.map_err(fetch_err)?;
        parse_tilejson(&body)
    }
}

/// Parse a TileJSON document.
pub fn parse_tilejson(body: &[u8]) -> Result<TileJson, DescriptorError> {
    let tilejson: TileJson =
        serde_json::from_slice(body).map_err(|e| DescriptorError::Parse(e.to_string()))?;
    if tilejson.tiles.is_empty() {
        return Err(DescriptorError::MissingTiles);
    }
    Ok(tilejson)
}

/// Resolve the TileJSON for a descriptor.
///
/// Sources with a `url` are fetched through `provider` (after `mapbox://`
/// normalization); sources with inline `tiles` resolve immediately without
/// touching the provider.
pub async fn load_tilejson(
    descriptor: &SourceDescriptor,
    provider: &dyn DescriptorProvider,
    options: &UrlOptions,
) -> Result<TileJson, DescriptorError> {
    if let Some(url) = descriptor.url.as_deref() {
        let resolved = normalize_source_url(url, options).map_err(|e| DescriptorError::Fetch {
            url: url.to_string(),
            source: e,
        })?;
        debug!(url = %resolved, "Loading TileJSON");
        return provider.load(&resolved).await;
    }

    if descriptor.tiles.is_empty() {
        return Err(DescriptorError::MissingTiles);
    }

    Ok(TileJson {
        tiles: descriptor.tiles.clone(),
        minzoom: Some(descriptor.minzoom),
        maxzoom: Some(descriptor.maxzoom),
        bounds: descriptor.bounds,
        attribution: descriptor.attribution.clone(),
    })
}
