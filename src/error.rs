use thiserror::Error;

use crate::tile::TileCoord;

/// Errors raised while fetching tile bytes from the network layer
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// URL could not be parsed or is not fetchable
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Errors produced while building an elevation pyramid
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PyramidError {
    /// Source image has a zero dimension
    #[error("Cannot build pyramid from {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },

    /// Pixel buffer does not match the declared dimensions
    #[error("Pixel buffer has {actual} bytes, expected {expected} for RGBA {width}x{height}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Per-tile errors.
///
/// These never escape the lifecycle manager as `Err`; they are recorded on the
/// tile and surfaced through a `TileErrored` event.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Network failure for one tile (retryable)
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Image bytes could not be decoded
    #[error("Decode failed: {message}")]
    Decode { message: String },

    /// Caller broke a request or pool contract
    #[error("Protocol violation: {0}")]
    Protocol(String),
}

impl From<PyramidError> for TileError {
    fn from(err: PyramidError) -> Self {
        TileError::Decode {
            message: err.to_string(),
        }
    }
}

impl TileError {
    /// Whether a later request for the same tile may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TileError::Fetch(_))
    }
}

/// Errors loading source metadata (TileJSON)
#[derive(Debug, Clone, Error)]
pub enum DescriptorError {
    /// Metadata could not be fetched
    #[error("Failed to fetch TileJSON from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    /// Metadata was fetched but is not valid TileJSON
    #[error("Invalid TileJSON: {0}")]
    Parse(String),

    /// Neither inline tiles nor a metadata URL were given
    #[error("Source has no tile URL templates")]
    MissingTiles,
}

/// Source-level errors returned from lifecycle manager operations
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Metadata load failed; the source is halted until a new descriptor arrives
    #[error("Source descriptor unavailable: {0}")]
    DescriptorUnavailable(DescriptorError),

    /// Metadata has not arrived yet
    #[error("Source descriptor has not loaded yet")]
    NotReady,

    /// Tile zoom lies outside the source's zoom range
    #[error("Tile {coord} outside source zoom range {minzoom}..={maxzoom}")]
    ZoomOutOfRange {
        coord: TileCoord,
        minzoom: u8,
        maxzoom: u8,
    },

    /// The source has been torn down
    #[error("Source has been torn down")]
    TornDown,

    /// Caller broke a request or pool contract
    #[error("Protocol violation: {0}")]
    Protocol(String),
}
