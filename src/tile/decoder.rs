//! Raster tile decoder.
//!
//! Turns fetched tile bytes (PNG, JPEG or WebP) into a flat RGBA8 buffer ready
//! for texture upload or elevation decoding.
//!
//! # Design Decisions
//!
//! - **Format sniffing**: the container format is guessed from the bytes, not
//!   from the URL, since tile servers routinely serve PNG under `.jpg` paths.
//!
//! - **Always RGBA8**: every image is converted to 4 channels so the texture
//!   pool and the pyramid builder only ever see one pixel layout.

use std::io::Cursor;

use bytes::Bytes;
use image::ImageReader;

use crate::error::TileError;

/// Bytes per RGBA8 pixel.
pub const RGBA_CHANNELS: usize = 4;

// =============================================================================
// Decoded Image
// =============================================================================

/// A decoded tile image in RGBA8 layout, row-major from the top-left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// `width * height * 4` bytes
    pub pixels: Bytes,
}

impl DecodedImage {
    /// Wrap an existing RGBA8 buffer.
    pub fn from_rgba(width: u32, height: u32, pixels: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            pixels: pixels.into(),
        }
    }

    /// The RGBA value at `(x, y)`, or `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * RGBA_CHANNELS;
        let px = self.pixels.get(offset..offset + RGBA_CHANNELS)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

// =============================================================================
// Decoder
// =============================================================================

/// Decodes fetched tile bytes into [`DecodedImage`]s.
#[derive(Debug, Clone, Default)]
pub struct TileDecoder {}

impl TileDecoder {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self {}
    }

    /// Decode image bytes into RGBA8.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::Decode`] if the format cannot be recognized or
    /// the data is corrupt.
    pub fn decode(&self, source: &[u8]) -> Result<DecodedImage, TileError> {
        let reader = ImageReader::new(Cursor::new(source))
            .with_guessed_format()
            .map_err(|e| TileError::Decode {
                message: e.to_string(),
            })?;

        let img = reader.decode().map_err(|e| TileError::Decode {
            message: e.to_string(),
        })?;

        let rgba = img.into_rgba8();
        let (width, height) = rgba.dimensions();

        Ok(DecodedImage {
            width,
            height,
            pixels: Bytes::from(rgba.into_raw()),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
