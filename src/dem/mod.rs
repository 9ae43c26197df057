//! Elevation (DEM) decoding.
//!
//! Terrain tiles pack an elevation into each pixel's RGB channels. This module
//! decodes those pixels and builds a [`DemPyramid`] of progressively
//! downsampled height fields. Everything here is pure: no I/O and no GPU work.
//!
//! # Example
//!
//! ```
//! use raster_tile_source::dem::{DemPyramid, Terrarium};
//! use raster_tile_source::tile::DecodedImage;
//!
//! // 4x4 tile at sea level in the Terrarium encoding
//! let pixels: Vec<u8> = std::iter::repeat([128u8, 0, 0, 255]).take(16).flatten().collect();
//! let image = DecodedImage::from_rgba(4, 4, pixels);
//!
//! let pyramid = DemPyramid::build(&image, &Terrarium).unwrap();
//! assert_eq!(pyramid.level_count(), 3);
//! assert_eq!(pyramid.base().get(0, 0), Some(0.0));
//! ```

mod encoding;
mod pyramid;

pub use encoding::{DemEncoding, DemEncodingKind, MapboxTerrainRgb, Terrarium};
pub use pyramid::{DemLevel, DemPyramid};
