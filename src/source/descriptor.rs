//! Source descriptors and their serialized snapshot.

use serde::{Deserialize, Serialize};

use crate::dem::DemEncodingKind;

/// Default lowest zoom level a source serves.
pub const DEFAULT_MIN_ZOOM: u8 = 0;

/// Default highest zoom level a source serves.
pub const DEFAULT_MAX_ZOOM: u8 = 22;

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

// =============================================================================
// Enumerations
// =============================================================================

/// Tile row addressing scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Rows count from the north (slippy map convention)
    #[default]
    Xyz,
    /// Rows count from the south
    Tms,
}

/// What a source's tiles contain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    /// Plain imagery uploaded as-is
    #[default]
    Raster,
    /// Elevation packed into RGB channels
    RasterDem,
}

// =============================================================================
// Source Descriptor
// =============================================================================

/// How to address and fetch tiles for one source.
///
/// Deserializes from a style-document source entry, e.g.
///
/// ```json
/// { "type": "raster-dem", "url": "mapbox://mapbox.terrain-rgb", "tileSize": 256 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SourceDescriptor {
    /// Raster imagery or packed elevation
    #[serde(rename = "type")]
    pub source_type: SourceType,

    /// TileJSON URL (plain HTTP or `mapbox://`)
    pub url: Option<String>,

    /// Tile URL templates
    pub tiles: Vec<String>,

    pub minzoom: u8,
    pub maxzoom: u8,

    /// Tile edge length in pixels
    pub tile_size: u32,

    pub scheme: Scheme,

    /// Whether the viewport should snap to integer zoom levels for this source
    pub round_zoom: bool,

    /// Elevation encoding for `raster-dem` sources
    pub encoding: DemEncodingKind,

    /// Geographic bounds `[west, south, east, north]` from TileJSON
    pub bounds: Option<[f64; 4]>,

    pub attribution: Option<String>,
}

impl Default for SourceDescriptor {
    fn default() -> Self {
        Self {
            source_type: SourceType::Raster,
            url: None,
            tiles: Vec::new(),
            minzoom: DEFAULT_MIN_ZOOM,
            maxzoom: DEFAULT_MAX_ZOOM,
            tile_size: DEFAULT_TILE_SIZE,
            scheme: Scheme::Xyz,
            round_zoom: true,
            encoding: DemEncodingKind::Mapbox,
            bounds: None,
            attribution: None,
        }
    }
}

impl SourceDescriptor {
    /// Raster source with inline URL templates.
    pub fn raster(tiles: Vec<String>) -> Self {
        Self {
            tiles,
            ..Self::default()
        }
    }

    /// Elevation source with inline URL templates.
    pub fn raster_dem(tiles: Vec<String>, encoding: DemEncodingKind) -> Self {
        Self {
            source_type: SourceType::RasterDem,
            tiles,
            encoding,
            ..Self::default()
        }
    }

    /// Source whose templates come from a TileJSON document.
    pub fn from_url(source_type: SourceType, url: impl Into<String>) -> Self {
        Self {
            source_type,
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Builder-style tile size override.
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Builder-style scheme override.
    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Builder-style zoom range override.
    pub fn with_zoom_range(mut self, minzoom: u8, maxzoom: u8) -> Self {
        self.minzoom = minzoom;
        self.maxzoom = maxzoom;
        self
    }

    /// Whether tiles from this source carry elevation.
    pub fn is_elevation(&self) -> bool {
        self.source_type == SourceType::RasterDem
    }

    /// Whether `zoom` lies in `[minzoom, maxzoom]`.
    pub fn covers_zoom(&self, zoom: u8) -> bool {
        zoom >= self.minzoom && zoom <= self.maxzoom
    }

    /// Merge fetched TileJSON metadata into this descriptor.
    ///
    /// Only the addressing fields are taken over; `type`, `scheme`, `tileSize`
    /// and `url` stay as configured.
    pub fn merge_tilejson(&mut self, tilejson: TileJson) {
        self.tiles = tilejson.tiles;
        if let Some(minzoom) = tilejson.minzoom {
            self.minzoom = minzoom;
        }
        if let Some(maxzoom) = tilejson.maxzoom {
            self.maxzoom = maxzoom;
        }
        if tilejson.bounds.is_some() {
            self.bounds = tilejson.bounds;
        }
        if tilejson.attribution.is_some() {
            self.attribution = tilejson.attribution;
        }
    }

    /// Descriptive snapshot for persistence and debugging.
    pub fn snapshot(&self) -> SourceSnapshot {
        SourceSnapshot {
            source_type: self.source_type,
            url: self.url.clone(),
            tiles: self.tiles.clone(),
            tile_size: self.tile_size,
            encoding: self.is_elevation().then_some(self.encoding),
        }
    }
}

// =============================================================================
// TileJSON
// =============================================================================

/// The subset of a TileJSON document this crate consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TileJson {
    pub tiles: Vec<String>,

    #[serde(default)]
    pub minzoom: Option<u8>,

    #[serde(default)]
    pub maxzoom: Option<u8>,

    #[serde(default)]
    pub bounds: Option<[f64; 4]>,

    #[serde(default)]
    pub attribution: Option<String>,
}

// =============================================================================
// Snapshot
// =============================================================================

/// Serialized description of a source: `{type, url, tiles, tileSize}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSnapshot {
    #[serde(rename = "type")]
    pub source_type: SourceType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tiles: Vec<String>,

    pub tile_size: u32,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub encoding: Option<DemEncodingKind>,
}
