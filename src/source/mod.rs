//! Source descriptors, URL formation and TileJSON loading.
//!
//! A source descriptor says where tiles live and how they are addressed. It
//! is supplied once when a source is created and may be enriched a single time
//! by a fetched TileJSON document before the first tile loads.
//!
//! # Usage
//!
//! ```
//! use raster_tile_source::source::{resolve_tile_url, Scheme, SourceDescriptor};
//! use raster_tile_source::tile::TileCoord;
//!
//! let descriptor = SourceDescriptor::raster(vec![
//!     "https://tiles.example.com/{z}/{x}/{y}.png".to_string(),
//! ])
//! .with_scheme(Scheme::Tms);
//!
//! let url = resolve_tile_url(TileCoord::new(1, 0, 0), &descriptor.tiles, descriptor.scheme, 1.0);
//! assert_eq!(url.as_deref(), Some("https://tiles.example.com/1/0/1.png"));
//! ```

mod descriptor;
mod tilejson;
mod url;

pub use descriptor::{
    Scheme, SourceDescriptor, SourceSnapshot, SourceType, TileJson, DEFAULT_MAX_ZOOM,
    DEFAULT_MIN_ZOOM, DEFAULT_TILE_SIZE,
};
pub use tilejson::{load_tilejson, parse_tilejson, DescriptorProvider, HttpDescriptorProvider};
pub use self::url::{
    is_mapbox_url, normalize_source_url, normalize_tile_url, resolve_tile_url, UrlOptions,
    DEFAULT_API_URL,
};
