//! Tile and source URL formation.
//!
//! Two steps turn a tile coordinate into a request URL:
//!
//! 1. [`resolve_tile_url`] picks a template and substitutes the coordinate
//!    placeholders (`{z}`, `{x}`, `{y}`, `{prefix}`, `{quadkey}`,
//!    `{bbox-epsg-3857}`, `{ratio}`), inverting the row for TMS sources.
//! 2. [`normalize_tile_url`] rewrites URLs belonging to `mapbox://` sources
//!    onto the configured API host, adds the `@2x` density suffix and the
//!    access token.
//!
//! [`normalize_source_url`] does the same for `mapbox://` TileJSON URLs.

use url::Url;

use crate::error::FetchError;
use crate::tile::TileCoord;

use super::descriptor::Scheme;

/// Default API origin for `mapbox://` URLs.
pub const DEFAULT_API_URL: &str = "https://api.mapbox.com";

const MAPBOX_SCHEME: &str = "mapbox://";

/// Settings that affect URL normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlOptions {
    /// Origin that `mapbox://` URLs are rewritten onto
    pub api_url: String,

    /// Public access token appended to `mapbox://` requests
    pub access_token: Option<String>,

    /// Device pixel ratio of the display
    pub pixel_ratio: f32,
}

impl Default for UrlOptions {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            access_token: None,
            pixel_ratio: 1.0,
        }
    }
}

impl UrlOptions {
    fn is_high_density(&self) -> bool {
        self.pixel_ratio >= 2.0
    }
}

/// Whether `url` uses the `mapbox://` scheme.
pub fn is_mapbox_url(url: &str) -> bool {
    url.starts_with(MAPBOX_SCHEME)
}

/// Substitute a tile coordinate into one of `templates`.
///
/// Templates are spread across tiles by `(x + y) % templates.len()` so
/// sharded hosts (`a.`, `b.`, `c.`) share the load. Returns `None` when there
/// are no templates.
pub fn resolve_tile_url(
    coord: TileCoord,
    templates: &[String],
    scheme: Scheme,
    pixel_ratio: f32,
) -> Option<String> {
    if templates.is_empty() {
        return None;
    }
    let index = ((u64::from(coord.x) + u64::from(coord.y)) % templates.len() as u64) as usize;
    let template = &templates[index];

    let y = match scheme {
        Scheme::Xyz => coord.y,
        Scheme::Tms => coord.tms_y(),
    };
    let prefix = format!("{:x}{:x}", coord.x % 16, coord.y % 16);
    let [min_x, min_y, max_x, max_y] = coord.bbox_epsg_3857();
    let bbox = format!("{},{},{},{}", min_x, min_y, max_x, max_y);
    let ratio = if pixel_ratio >= 2.0 { "@2x" } else { "" };

    Some(
        template
            .replace("{prefix}", &prefix)
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &y.to_string())
            .replace("{quadkey}", &coord.quadkey())
            .replace("{bbox-epsg-3857}", &bbox)
            .replace("{ratio}", ratio),
    )
}

/// Rewrite a resolved tile URL for requests against a `mapbox://` source.
///
/// URLs of any other source are returned unchanged.
///
/// # Errors
///
/// Returns [`FetchError::InvalidUrl`] if either URL cannot be parsed or the
/// access token is missing or secret.
pub fn normalize_tile_url(
    tile_url: &str,
    source_url: Option<&str>,
    tile_size: u32,
    options: &UrlOptions,
) -> Result<String, FetchError> {
    if !source_url.is_some_and(is_mapbox_url) {
        return Ok(tile_url.to_string());
    }

    let mut url = Url::parse(tile_url).map_err(|e| invalid(tile_url, e))?;

    let suffix = if options.is_high_density() || tile_size == 512 {
        "@2x"
    } else {
        ""
    };
    let path = with_scale_suffix(url.path(), suffix);
    url.set_path(&path);

    make_api_url(url, options)
}

/// Turn a `mapbox://{id}` source URL into its TileJSON endpoint.
///
/// Non-`mapbox://` URLs are returned unchanged.
pub fn normalize_source_url(source_url: &str, options: &UrlOptions) -> Result<String, FetchError> {
    if !is_mapbox_url(source_url) {
        return Ok(source_url.to_string());
    }

    let parsed = Url::parse(source_url).map_err(|e| invalid(source_url, e))?;
    let id = parsed
        .host_str()
        .ok_or_else(|| FetchError::InvalidUrl(format!("{}: missing tileset id", source_url)))?;

    let mut url = Url::parse(&options.api_url).map_err(|e| invalid(&options.api_url, e))?;
    url.set_path(&format!("/v4/{}.json", id));
    url.query_pairs_mut().append_key_only("secure");

    make_api_url(url, options)
}

/// Move `url` onto the API origin and append the access token.
fn make_api_url(mut url: Url, options: &UrlOptions) -> Result<String, FetchError> {
    let api = Url::parse(&options.api_url).map_err(|e| invalid(&options.api_url, e))?;

    url.set_scheme(api.scheme())
        .map_err(|_| FetchError::InvalidUrl(format!("cannot use scheme of {}", api)))?;
    url.set_host(api.host_str())
        .map_err(|e| invalid(&options.api_url, e))?;
    url.set_port(api.port())
        .map_err(|_| FetchError::InvalidUrl(format!("cannot use port of {}", api)))?;

    let token = options.access_token.as_deref().ok_or_else(|| {
        FetchError::InvalidUrl(format!("an access token is required to request {}", url))
    })?;
    if token.starts_with('s') {
        return Err(FetchError::InvalidUrl(
            "use a public access token (pk.*), not a secret one (sk.*)".to_string(),
        ));
    }

    url.query_pairs_mut().append_pair("access_token", token);
    Ok(url.into())
}

/// Insert `suffix` before a trailing `.png`/`.jpg` extension (optionally
/// followed by digits, e.g. `.png32`).
fn with_scale_suffix(path: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return path.to_string();
    }
    let Some(dot) = path.rfind('.') else {
        return path.to_string();
    };
    let extension = &path[dot + 1..];
    let is_image = ["png", "jpg"].iter().any(|known| {
        extension
            .strip_prefix(known)
            .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()))
    });
    if !is_image {
        return path.to_string();
    }
    format!("{}{}{}", &path[..dot], suffix, &path[dot..])
}

fn invalid(url: &str, err: impl std::fmt::Display) -> FetchError {
    FetchError::InvalidUrl(format!("{}: {}", url, err))
}
