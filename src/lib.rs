//! # Raster Tile Source
//!
//! Tile acquisition and GPU texture lifecycle for a tiled map renderer.
//!
//! For each visible tile this library fetches raster image data, decodes it,
//! optionally turns it into a multi-resolution elevation pyramid, binds the
//! result to a pooled GPU texture, and reclaims everything when the tile
//! leaves the viewport.
//!
//! ## Features
//!
//! - **Cancellable loads**: One fetch per tile, aborted cleanly when the tile is released
//! - **Elevation pyramids**: Mapbox Terrain-RGB and Terrarium decoding with 2x2 downsampling
//! - **Texture pooling**: Size-classed GPU handles reused instead of reallocated
//! - **TileJSON sources**: Inline templates, TileJSON URLs and `mapbox://` URLs
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`tile`] - Tile lifecycle manager, request controller and decoder
//! - [`dem`] - Elevation encodings and pyramid builder
//! - [`texture`] - Texture pool and rendering backend abstraction
//! - [`source`] - Source descriptors, URL formation and TileJSON loading
//! - [`io`] - Network fetching
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use raster_tile_source::{
//!     HeadlessBackend, HttpImageFetcher, SourceDescriptor, SourceEvent, TileCoord, TileManager,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let descriptor = SourceDescriptor::raster(vec![
//!         "https://tiles.example.com/{z}/{x}/{y}.png".to_string(),
//!     ]);
//!     let fetcher = Arc::new(HttpImageFetcher::new()?);
//!     let mut manager = TileManager::new("imagery", descriptor, fetcher, HeadlessBackend::new());
//!     let mut events = manager.subscribe();
//!
//!     manager.request_tile(TileCoord::new(5, 10, 12))?;
//!     manager.run_until_idle().await;
//!
//!     while let Ok(event) = events.try_recv() {
//!         if let SourceEvent::TileLoaded(coord) = event {
//!             println!("loaded {}", coord);
//!         }
//!     }
//!
//!     manager.release_tile(TileCoord::new(5, 10, 12))?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dem;
pub mod error;
pub mod io;
pub mod source;
pub mod texture;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command, FetchConfig, PyramidConfig, SourceArgs, UrlConfig};
pub use dem::{DemEncoding, DemEncodingKind, DemLevel, DemPyramid, MapboxTerrainRgb, Terrarium};
pub use error::{DescriptorError, FetchError, PyramidError, SourceError, TileError};
pub use io::{HttpImageFetcher, ImageFetcher};
pub use source::{
    DescriptorProvider, HttpDescriptorProvider, Scheme, SourceDescriptor, SourceSnapshot,
    SourceType, TileJson, UrlOptions,
};
pub use texture::{HeadlessBackend, RenderBackend, SizeClass, TextureHandle, TexturePool};
pub use tile::{
    DecodedImage, ManagerOptions, RequestController, SourceEvent, TileCoord, TileDecoder,
    TileManager, TileRecord, TileState,
};
