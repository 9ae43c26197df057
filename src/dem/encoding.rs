//! Elevation encodings for packed RGB terrain tiles.
//!
//! The channel-to-height mapping is a contract with whatever produced the
//! tiles, so it is pluggable through [`DemEncoding`]. Two widely deployed
//! encodings ship with the crate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reversible mapping between an RGB triple and an elevation in meters.
pub trait DemEncoding: Send + Sync + fmt::Debug {
    /// Decode a packed RGB triple into an elevation.
    fn decode(&self, rgb: [u8; 3]) -> f32;

    /// Encode an elevation back into an RGB triple.
    ///
    /// Values outside the representable range are clamped.
    fn encode(&self, elevation: f32) -> [u8; 3];
}

/// Mapbox Terrain-RGB: `-10000 + (R * 65536 + G * 256 + B) * 0.1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapboxTerrainRgb;

impl DemEncoding for MapboxTerrainRgb {
    fn decode(&self, [r, g, b]: [u8; 3]) -> f32 {
        let packed = (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b);
        (-10_000.0 + f64::from(packed) * 0.1) as f32
    }

    fn encode(&self, elevation: f32) -> [u8; 3] {
        let packed = ((f64::from(elevation) + 10_000.0) * 10.0)
            .round()
            .clamp(0.0, 16_777_215.0) as u32;
        [(packed >> 16) as u8, (packed >> 8) as u8, packed as u8]
    }
}

/// Mapzen Terrarium: `R * 256 + G + B / 256 - 32768`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Terrarium;

impl DemEncoding for Terrarium {
    fn decode(&self, [r, g, b]: [u8; 3]) -> f32 {
        (f64::from(r) * 256.0 + f64::from(g) + f64::from(b) / 256.0 - 32_768.0) as f32
    }

    fn encode(&self, elevation: f32) -> [u8; 3] {
        let scaled = ((f64::from(elevation) + 32_768.0) * 256.0)
            .round()
            .clamp(0.0, 16_777_215.0) as u32;
        [(scaled >> 16) as u8, (scaled >> 8) as u8, scaled as u8]
    }
}

/// Encoding selector used in source options and TileJSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DemEncodingKind {
    #[default]
    Mapbox,
    Terrarium,
}

impl DemEncodingKind {
    /// The encoding implementation for this selector.
    pub fn encoding(self) -> &'static dyn DemEncoding {
        match self {
            DemEncodingKind::Mapbox => &MapboxTerrainRgb,
            DemEncodingKind::Terrarium => &Terrarium,
        }
    }
}

impl fmt::Display for DemEncodingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DemEncodingKind::Mapbox => f.write_str("mapbox"),
            DemEncodingKind::Terrarium => f.write_str("terrarium"),
        }
    }
}
