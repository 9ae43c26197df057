//! Tile coordinates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Address of one tile within a source: zoom level plus column and row.
///
/// Rows count from the top (XYZ convention); TMS row inversion happens only
/// when a request URL is formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level
    pub z: u8,

    /// Column (0-indexed from the west)
    pub x: u32,

    /// Row (0-indexed from the north)
    pub y: u32,
}

impl TileCoord {
    /// Create a new tile coordinate.
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Number of tiles along one axis at this zoom level.
    pub fn tiles_per_axis(&self) -> u64 {
        1u64 << self.z
    }

    /// Whether the column and row lie inside the zoom level's grid.
    pub fn is_valid(&self) -> bool {
        self.z < 32
            && u64::from(self.x) < self.tiles_per_axis()
            && u64::from(self.y) < self.tiles_per_axis()
    }

    /// Row in the TMS convention (counted from the south).
    pub fn tms_y(&self) -> u32 {
        (self.tiles_per_axis() - 1 - u64::from(self.y)) as u32
    }

    /// Bing-style quadkey for this tile.
    pub fn quadkey(&self) -> String {
        let mut key = String::with_capacity(self.z as usize);
        for i in (1..=self.z).rev() {
            let mask = 1u32 << (i - 1);
            let mut digit = b'0';
            if self.x & mask != 0 {
                digit += 1;
            }
            if self.y & mask != 0 {
                digit += 2;
            }
            key.push(digit as char);
        }
        key
    }

    /// Web Mercator (EPSG:3857) bounding box as `minx,miny,maxx,maxy`.
    pub fn bbox_epsg_3857(&self) -> [f64; 4] {
        const HALF_WORLD: f64 = 20_037_508.342_789_244;
        let size = 2.0 * HALF_WORLD / self.tiles_per_axis() as f64;
        let min_x = -HALF_WORLD + f64::from(self.x) * size;
        let max_y = HALF_WORLD - f64::from(self.y) * size;
        [min_x, max_y - size, min_x + size, max_y]
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}
