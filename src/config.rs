//! Configuration management for the raster tile source tool.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `RTS_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use raster_tile_source::config::{Cli, Command};
//!
//! // Parse from command line and environment
//! let cli = Cli::parse();
//!
//! match cli.into_command() {
//!     Command::Fetch(config) => println!("{} tiles", config.coords.len()),
//!     Command::Pyramid(config) => println!("{}", config.path.display()),
//!     Command::Url(config) => println!("{}", config.coord),
//! }
//! ```
//!
//! # Environment Variables
//!
//! Source options can be set via environment variables with the `RTS_` prefix:
//!
//! - `RTS_TILES` - Comma-separated tile URL templates
//! - `RTS_URL` - TileJSON URL (plain HTTP or `mapbox://`)
//! - `RTS_ACCESS_TOKEN` - Public access token for `mapbox://` URLs
//! - `RTS_API_URL` - API origin for `mapbox://` URLs (default: https://api.mapbox.com)
//! - `RTS_PIXEL_RATIO` - Device pixel ratio (default: 1)
//! - `RTS_TILE_SIZE` - Tile edge length in pixels (default: 512)
//! - `RTS_MAX_IDLE_TEXTURES` - Bound on idle textures kept for reuse (default: unbounded)
//! - `RTS_FETCH_TIMEOUT` - Per-request timeout in seconds (default: 30)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::dem::DemEncodingKind;
use crate::io::DEFAULT_FETCH_TIMEOUT_SECS;
use crate::source::{
    Scheme, SourceDescriptor, SourceType, UrlOptions, DEFAULT_API_URL, DEFAULT_MAX_ZOOM,
    DEFAULT_MIN_ZOOM, DEFAULT_TILE_SIZE,
};
use crate::tile::TileCoord;

// =============================================================================
// Default Values
// =============================================================================

/// Default device pixel ratio.
pub const DEFAULT_PIXEL_RATIO: f32 = 1.0;

/// Default source id used in logs.
pub const DEFAULT_SOURCE_ID: &str = "cli";

/// Highest zoom level accepted on the command line.
pub const MAX_SUPPORTED_ZOOM: u8 = 30;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Raster Tile Source - fetch, decode and pool map tiles.
#[derive(Parser, Debug, Clone)]
#[command(name = "raster-tile-source")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Consume the parsed arguments and return the selected command.
    pub fn into_command(self) -> Command {
        self.command
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Load tiles through the lifecycle manager and report the outcome
    Fetch(FetchConfig),

    /// Decode a local elevation image and print its pyramid
    Pyramid(PyramidConfig),

    /// Print the request URL for a tile
    Url(UrlConfig),
}

// =============================================================================
// Source Arguments
// =============================================================================

/// Options describing one tile source.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Tile URL templates (comma-separated), e.g. https://t/{z}/{x}/{y}.png
    #[arg(long, env = "RTS_TILES", value_delimiter = ',')]
    pub tiles: Vec<String>,

    /// TileJSON URL; `mapbox://` URLs are rewritten onto the API origin.
    #[arg(long, env = "RTS_URL")]
    pub url: Option<String>,

    /// Source type.
    #[arg(long = "type", value_enum, default_value_t = SourceType::Raster)]
    pub source_type: SourceType,

    /// Elevation encoding for raster-dem sources.
    #[arg(long, value_enum, default_value_t = DemEncodingKind::Mapbox)]
    pub encoding: DemEncodingKind,

    /// Tile row addressing scheme.
    #[arg(long, value_enum, default_value_t = Scheme::Xyz)]
    pub scheme: Scheme,

    /// Tile edge length in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "RTS_TILE_SIZE")]
    pub tile_size: u32,

    /// Lowest zoom level served by the source.
    #[arg(long, default_value_t = DEFAULT_MIN_ZOOM)]
    pub minzoom: u8,

    /// Highest zoom level served by the source.
    #[arg(long, default_value_t = DEFAULT_MAX_ZOOM)]
    pub maxzoom: u8,

    /// Public access token for `mapbox://` URLs.
    #[arg(long, env = "RTS_ACCESS_TOKEN")]
    pub access_token: Option<String>,

    /// API origin that `mapbox://` URLs are rewritten onto.
    #[arg(long, default_value = DEFAULT_API_URL, env = "RTS_API_URL")]
    pub api_url: String,

    /// Device pixel ratio.
    #[arg(long, default_value_t = DEFAULT_PIXEL_RATIO, env = "RTS_PIXEL_RATIO")]
    pub pixel_ratio: f32,
}

impl SourceArgs {
    /// Validate the source options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.tiles.is_empty() && self.url.is_none() {
            return Err(
                "No tile source given. Set --tiles or RTS_TILES, or --url or RTS_URL".to_string(),
            );
        }

        if self.minzoom > self.maxzoom {
            return Err(format!(
                "minzoom ({}) must not exceed maxzoom ({})",
                self.minzoom, self.maxzoom
            ));
        }
        if self.maxzoom > MAX_SUPPORTED_ZOOM {
            return Err(format!("maxzoom must be at most {}", MAX_SUPPORTED_ZOOM));
        }

        if self.tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }

        if self.pixel_ratio.is_nan() || self.pixel_ratio <= 0.0 {
            return Err("pixel_ratio must be greater than 0".to_string());
        }

        if let Some(token) = &self.access_token {
            if token.starts_with('s') {
                return Err("Use a public access token (pk.*), not a secret one (sk.*)".to_string());
            }
        }

        Ok(())
    }

    /// Build the source descriptor these options describe.
    pub fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            source_type: self.source_type,
            url: self.url.clone(),
            tiles: self.tiles.clone(),
            minzoom: self.minzoom,
            maxzoom: self.maxzoom,
            tile_size: self.tile_size,
            scheme: self.scheme,
            encoding: self.encoding,
            ..SourceDescriptor::default()
        }
    }

    /// URL normalization settings.
    pub fn url_options(&self) -> UrlOptions {
        UrlOptions {
            api_url: self.api_url.clone(),
            access_token: self.access_token.clone(),
            pixel_ratio: self.pixel_ratio,
        }
    }
}

// =============================================================================
// Fetch Command
// =============================================================================

/// Load tiles and report states, events and pool statistics.
#[derive(Args, Debug, Clone)]
pub struct FetchConfig {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Tiles to load, as z/x/y.
    #[arg(required = true, value_parser = parse_tile_coord)]
    pub coords: Vec<TileCoord>,

    /// Release every tile after loading, returning textures to the pool.
    #[arg(long, default_value_t = false)]
    pub release: bool,

    /// Bound on idle textures kept for reuse; the oldest is destroyed past it.
    #[arg(long, env = "RTS_MAX_IDLE_TEXTURES")]
    pub max_idle_textures: Option<usize>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_SECS, env = "RTS_FETCH_TIMEOUT")]
    pub timeout: u64,

    /// Print the serialized source snapshot as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl FetchConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.source.validate()?;

        if self.timeout == 0 {
            return Err("timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

// =============================================================================
// Pyramid Command
// =============================================================================

/// Decode a local elevation image.
#[derive(Args, Debug, Clone)]
pub struct PyramidConfig {
    /// Path to a PNG or WebP elevation tile.
    pub path: PathBuf,

    /// Elevation encoding of the image.
    #[arg(long, value_enum, default_value_t = DemEncodingKind::Mapbox)]
    pub encoding: DemEncodingKind,

    /// Print every sample of levels at or below this edge length.
    #[arg(long)]
    pub dump_below: Option<u32>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl PyramidConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.path.is_file() {
            return Err(format!("{} is not a file", self.path.display()));
        }
        Ok(())
    }
}

// =============================================================================
// Url Command
// =============================================================================

/// Resolve a tile's request URL.
#[derive(Args, Debug, Clone)]
pub struct UrlConfig {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Tile to resolve, as z/x/y.
    #[arg(value_parser = parse_tile_coord)]
    pub coord: TileCoord,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl UrlConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.source.validate()?;

        if !self.coord.is_valid() {
            return Err(format!("{} is not a valid tile coordinate", self.coord));
        }

        Ok(())
    }
}

/// Parse a `z/x/y` tile coordinate.
pub fn parse_tile_coord(value: &str) -> Result<TileCoord, String> {
    let parts: Vec<&str> = value.split('/').collect();
    let [z, x, y] = parts.as_slice() else {
        return Err(format!("expected z/x/y, got '{}'", value));
    };

    let z: u8 = z.parse().map_err(|_| format!("invalid zoom '{}'", z))?;
    let x: u32 = x.parse().map_err(|_| format!("invalid column '{}'", x))?;
    let y: u32 = y.parse().map_err(|_| format!("invalid row '{}'", y))?;

    if z > MAX_SUPPORTED_ZOOM {
        return Err(format!("zoom {} exceeds {}", z, MAX_SUPPORTED_ZOOM));
    }

    let coord = TileCoord::new(z, x, y);
    if !coord.is_valid() {
        return Err(format!("{} lies outside the zoom {} grid", coord, z));
    }
    Ok(coord)
}

// =============================================================================
// Tests
// =============================================================================
