//! Elevation pyramid construction.
//!
//! A [`DemPyramid`] is a mipmap-like stack of decoded height fields. Level 0
//! holds one elevation sample per source pixel; every further level halves both
//! dimensions (floor division) by averaging 2x2 blocks of the previous level.
//! Construction stops at the first level whose width or height is 1.
//!
//! When a dimension is odd, the trailing row or column is folded into the last
//! block of the next level, so blocks along that edge average up to 3x3
//! samples and no source sample is dropped.

use bytes::Bytes;

use crate::error::PyramidError;
use crate::tile::{DecodedImage, RGBA_CHANNELS};

use super::encoding::DemEncoding;

// =============================================================================
// DemLevel
// =============================================================================

/// One level of an elevation pyramid.
#[derive(Debug, Clone, PartialEq)]
pub struct DemLevel {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl DemLevel {
    /// Level width in samples.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Level height in samples.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major elevation samples; `len() == width * height`.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Elevation at `(x, y)`, or `None` when out of bounds.
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Pack this level into RGBA8 with the given encoding (alpha = 255).
    pub fn to_rgba(&self, encoding: &dyn DemEncoding) -> Bytes {
        let mut out = Vec::with_capacity(self.data.len() * RGBA_CHANNELS);
        for &elevation in &self.data {
            let [r, g, b] = encoding.encode(elevation);
            out.extend_from_slice(&[r, g, b, 255]);
        }
        Bytes::from(out)
    }

    fn downsample(&self) -> DemLevel {
        let width = self.width / 2;
        let height = self.height / 2;
        let src_w = self.width as usize;
        let mut data = Vec::with_capacity(width as usize * height as usize);

        for oy in 0..height {
            let y0 = oy * 2;
            let y1 = if oy + 1 == height { self.height } else { y0 + 2 };
            for ox in 0..width {
                let x0 = ox * 2;
                let x1 = if ox + 1 == width { self.width } else { x0 + 2 };

                let mut sum = 0.0f64;
                for y in y0..y1 {
                    let row = y as usize * src_w;
                    for x in x0..x1 {
                        sum += f64::from(self.data[row + x as usize]);
                    }
                }
                let count = f64::from((y1 - y0) * (x1 - x0));
                data.push((sum / count) as f32);
            }
        }

        DemLevel {
            width,
            height,
            data,
        }
    }
}

// =============================================================================
// DemPyramid
// =============================================================================

/// Immutable multi-resolution elevation field built from one tile image.
#[derive(Debug, Clone, PartialEq)]
pub struct DemPyramid {
    levels: Vec<DemLevel>,
}

impl DemPyramid {
    /// Build a pyramid from a decoded RGBA tile image.
    ///
    /// Level 0 decodes every pixel's RGB channels through `encoding`; the
    /// alpha channel is ignored.
    ///
    /// # Errors
    ///
    /// - [`PyramidError::EmptyImage`] if either dimension is zero
    /// - [`PyramidError::BufferSize`] if the pixel buffer is not `w * h * 4` bytes
    pub fn build(image: &DecodedImage, encoding: &dyn DemEncoding) -> Result<Self, PyramidError> {
        let (width, height) = (image.width, image.height);
        if width == 0 || height == 0 {
            return Err(PyramidError::EmptyImage { width, height });
        }

        let expected = width as usize * height as usize * RGBA_CHANNELS;
        if image.pixels.len() != expected {
            return Err(PyramidError::BufferSize {
                width,
                height,
                expected,
                actual: image.pixels.len(),
            });
        }

        let data = image
            .pixels
            .chunks_exact(RGBA_CHANNELS)
            .map(|px| encoding.decode([px[0], px[1], px[2]]))
            .collect();

        let mut levels = vec![DemLevel {
            width,
            height,
            data,
        }];

        loop {
            let last = &levels[levels.len() - 1];
            if last.width <= 1 || last.height <= 1 {
                break;
            }
            let next = last.downsample();
            levels.push(next);
        }

        Ok(Self { levels })
    }

    /// All levels, native resolution first.
    pub fn levels(&self) -> &[DemLevel] {
        &self.levels
    }

    /// A single level by index.
    pub fn level(&self, index: usize) -> Option<&DemLevel> {
        self.levels.get(index)
    }

    /// Number of levels (always at least 1).
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// The native-resolution level.
    pub fn base(&self) -> &DemLevel {
        &self.levels[0]
    }
}

// =============================================================================
// Tests
// =============================================================================
