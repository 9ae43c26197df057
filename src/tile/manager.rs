//! Tile Lifecycle Manager.
//!
//! The manager owns every tile record of one source and is the only place
//! tile state changes. It drives the request controller, builds elevation
//! pyramids for `raster-dem` sources, and binds results to pooled textures.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           TileManager                            │
//! │                                                                  │
//! │  request_tile ──▶ resolve URL ──▶ RequestController::load        │
//! │                                          │                       │
//! │                                   (spawned fetch)                │
//! │                                          │                       │
//! │  handle_completion ◀── next_update ◀─────┘                       │
//! │     │                                                            │
//! │     ├─ raster-dem: DemPyramid::build ─┐                          │
//! │     │                                 ▼                          │
//! │     └───────────────────────▶ TexturePool::acquire_or_reuse      │
//! │                                  + upload ──▶ Loaded             │
//! │                                                                  │
//! │  release_tile ──▶ abort (Loading) or TexturePool::release        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All methods take `&mut self`: the owning task is the single writer for tile
//! state and the pool. Only the network fetch runs elsewhere.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use crate::dem::DemPyramid;
use crate::error::{DescriptorError, SourceError, TileError};
use crate::io::ImageFetcher;
use crate::source::{
    load_tilejson, normalize_tile_url, resolve_tile_url, DescriptorProvider, SourceDescriptor,
    SourceSnapshot, TileJson, UrlOptions,
};
use crate::texture::{RenderBackend, SizeClass, TextureHandle, TexturePool};

use super::coord::TileCoord;
use super::decoder::DecodedImage;
use super::request::{Completion, RequestController};
use super::state::{TileRecord, TileState};

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

// =============================================================================
// Events
// =============================================================================

/// Notifications for the viewport and render layers.
///
/// Delivery is fire-and-forget: events sent while nobody is subscribed are
/// dropped, and slow subscribers may observe `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// Source metadata started loading
    DataLoading,

    /// A tile reached `Loaded`
    TileLoaded(TileCoord),

    /// A tile reached `Errored`
    TileErrored(TileCoord, TileError),

    /// Source metadata changed
    SourceDataChanged,

    /// Source metadata finished loading
    SourceLoaded,

    /// Source metadata failed to load
    Error(DescriptorError),
}

/// Availability of the source's descriptor.
#[derive(Debug, Clone)]
pub enum DescriptorState {
    /// TileJSON still has to be loaded
    Pending,

    /// Tile templates are known
    Ready,

    /// Loading failed; tile requests are refused until a new descriptor arrives
    Failed(DescriptorError),
}

impl DescriptorState {
    fn for_descriptor(descriptor: &SourceDescriptor) -> Self {
        if descriptor.url.is_some() {
            DescriptorState::Pending
        } else if descriptor.tiles.is_empty() {
            DescriptorState::Failed(DescriptorError::MissingTiles)
        } else {
            DescriptorState::Ready
        }
    }
}

// =============================================================================
// Options
// =============================================================================

/// Construction options for [`TileManager`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Bound on idle textures kept for reuse. `None` keeps every released
    /// texture until teardown.
    pub max_idle_textures: Option<usize>,

    /// Settings for tile and TileJSON URL formation
    pub url_options: UrlOptions,

    /// Buffered events per subscriber
    pub event_capacity: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            max_idle_textures: None,
            url_options: UrlOptions::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

// =============================================================================
// Tile Manager
// =============================================================================

/// Owns the tiles of one source and their GPU resources.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use raster_tile_source::io::HttpImageFetcher;
/// use raster_tile_source::source::SourceDescriptor;
/// use raster_tile_source::texture::HeadlessBackend;
/// use raster_tile_source::tile::{TileCoord, TileManager};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let descriptor = SourceDescriptor::raster(vec![
///     "https://tiles.example.com/{z}/{x}/{y}.png".to_string(),
/// ]);
/// let fetcher = Arc::new(HttpImageFetcher::new()?);
/// let mut manager = TileManager::new("satellite", descriptor, fetcher, HeadlessBackend::new());
///
/// manager.request_tile(TileCoord::new(2, 1, 1))?;
/// manager.run_until_idle().await;
/// # Ok(())
/// # }
/// ```
pub struct TileManager<B: RenderBackend> {
    id: String,
    descriptor: SourceDescriptor,
    descriptor_state: DescriptorState,
    url_options: UrlOptions,
    requests: RequestController,
    pool: TexturePool<B>,
    tiles: HashMap<TileCoord, TileRecord>,
    events: broadcast::Sender<SourceEvent>,
    torn_down: bool,
}

impl<B: RenderBackend> TileManager<B> {
    /// Create a manager with default options.
    pub fn new(
        id: impl Into<String>,
        descriptor: SourceDescriptor,
        fetcher: Arc<dyn ImageFetcher>,
        backend: B,
    ) -> Self {
        Self::with_options(id, descriptor, fetcher, backend, ManagerOptions::default())
    }

    /// Create a manager with explicit options.
    pub fn with_options(
        id: impl Into<String>,
        descriptor: SourceDescriptor,
        fetcher: Arc<dyn ImageFetcher>,
        backend: B,
        options: ManagerOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        let descriptor_state = DescriptorState::for_descriptor(&descriptor);
        let id = id.into();

        debug!(
            source = %id,
            source_type = ?descriptor.source_type,
            state = ?descriptor_state,
            "Created tile manager"
        );

        Self {
            id,
            descriptor,
            descriptor_state,
            url_options: options.url_options,
            requests: RequestController::new(fetcher),
            pool: match options.max_idle_textures {
                Some(max_idle) => TexturePool::with_max_idle(backend, max_idle),
                None => TexturePool::new(backend),
            },
            tiles: HashMap::new(),
            events,
            torn_down: false,
        }
    }

    /// Subscribe to source and tile events.
    pub fn subscribe(&self) -> broadcast::Receiver<SourceEvent> {
        self.events.subscribe()
    }

    // -------------------------------------------------------------------------
    // Descriptor
    // -------------------------------------------------------------------------

    /// Load the source's TileJSON once and merge it into the descriptor.
    ///
    /// Fires `DataLoading`, then either `SourceDataChanged` and `SourceLoaded`
    /// or a single `Error`. A source that is already ready is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::DescriptorUnavailable`] when loading fails; the
    /// same error is reported through the `Error` event.
    pub async fn load_descriptor(
        &mut self,
        provider: &dyn DescriptorProvider,
    ) -> Result<(), SourceError> {
        self.ensure_live()?;
        if matches!(self.descriptor_state, DescriptorState::Ready) && self.descriptor.url.is_some() {
            trace!(source = %self.id, "Descriptor already loaded");
            return Ok(());
        }

        self.emit(SourceEvent::DataLoading);
        let result = load_tilejson(&self.descriptor, provider, &self.url_options).await;
        self.apply_descriptor(result)
    }

    /// Apply the outcome of an externally performed TileJSON load.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::DescriptorUnavailable`] if `result` is an error.
    pub fn apply_descriptor(
        &mut self,
        result: Result<TileJson, DescriptorError>,
    ) -> Result<(), SourceError> {
        self.ensure_live()?;
        match result {
            Ok(tilejson) if tilejson.tiles.is_empty() => {
                self.fail_descriptor(DescriptorError::MissingTiles)
            }
            Ok(tilejson) => {
                self.descriptor.merge_tilejson(tilejson);
                self.descriptor_state = DescriptorState::Ready;
                info!(
                    source = %self.id,
                    templates = self.descriptor.tiles.len(),
                    minzoom = self.descriptor.minzoom,
                    maxzoom = self.descriptor.maxzoom,
                    "Source descriptor loaded"
                );
                self.emit(SourceEvent::SourceDataChanged);
                self.emit(SourceEvent::SourceLoaded);
                Ok(())
            }
            Err(err) => self.fail_descriptor(err),
        }
    }

    /// Replace the descriptor, e.g. after a failed load.
    ///
    /// Existing tiles are kept. A descriptor with a `url` must be loaded again
    /// with [`load_descriptor`](Self::load_descriptor).
    pub fn set_descriptor(&mut self, descriptor: SourceDescriptor) -> Result<(), SourceError> {
        self.ensure_live()?;
        self.descriptor_state = DescriptorState::for_descriptor(&descriptor);
        self.descriptor = descriptor;
        debug!(source = %self.id, state = ?self.descriptor_state, "Source descriptor replaced");
        self.emit(SourceEvent::SourceDataChanged);
        Ok(())
    }

    fn fail_descriptor(&mut self, err: DescriptorError) -> Result<(), SourceError> {
        warn!(source = %self.id, error = %err, "Source descriptor failed to load");
        self.descriptor_state = DescriptorState::Failed(err.clone());
        self.emit(SourceEvent::Error(err.clone()));
        Err(SourceError::DescriptorUnavailable(err))
    }

    // -------------------------------------------------------------------------
    // Tile requests
    // -------------------------------------------------------------------------

    /// Start loading `coord`.
    ///
    /// Idempotent for tiles that are already loading or loaded. An `Errored`
    /// or `Unloaded` tile is reset to `Idle` and loaded again.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] for source-level conditions only: torn down,
    /// descriptor not ready or failed, zoom out of range. Per-tile failures are
    /// reported through the tile's state and a `TileErrored` event.
    pub fn request_tile(&mut self, coord: TileCoord) -> Result<(), SourceError> {
        self.ensure_live()?;
        self.ensure_descriptor()?;

        if !coord.is_valid() {
            return Err(SourceError::Protocol(format!("invalid tile coordinate {}", coord)));
        }
        if !self.descriptor.covers_zoom(coord.z) {
            return Err(SourceError::ZoomOutOfRange {
                coord,
                minzoom: self.descriptor.minzoom,
                maxzoom: self.descriptor.maxzoom,
            });
        }

        let state = self.tiles.entry(coord).or_insert_with(TileRecord::new).state;
        match state {
            TileState::Loading | TileState::Loaded => {
                trace!(source = %self.id, %coord, %state, "Tile already requested");
                return Ok(());
            }
            TileState::Errored | TileState::Unloaded => self.transition(coord, TileState::Idle),
            TileState::Idle => {}
            TileState::Aborted => {
                // Aborted collapses to Unloaded inside release_tile
                return Err(SourceError::Protocol(format!("tile {} stuck in aborted", coord)));
            }
        }

        let url = match self.tile_url(coord) {
            Ok(url) => url,
            Err(err) => {
                // Still a per-tile failure: pass through Loading so the
                // transition sequence stays intact
                self.transition(coord, TileState::Loading);
                self.fail_tile(coord, err);
                return Ok(());
            }
        };

        let id = self
            .requests
            .load(coord, url)
            .map_err(|e| SourceError::Protocol(e.to_string()))?;

        if let Some(record) = self.tiles.get_mut(&coord) {
            record.request = Some(id);
        }
        self.transition(coord, TileState::Loading);
        debug!(source = %self.id, %coord, %id, "Tile loading");
        Ok(())
    }

    /// Release `coord` when it leaves the viewport.
    ///
    /// A loading tile is aborted and its late result discarded. A loaded tile
    /// returns its texture to the pool and drops its pyramid. Releasing an
    /// unknown or already unloaded tile is a no-op.
    ///
    /// The tile's record stays in the map in the `Unloaded` state so it can
    /// still be queried. Long-running callers should call
    /// [`TileManager::forget_unloaded`] periodically to drop those records.
    pub fn release_tile(&mut self, coord: TileCoord) -> Result<(), SourceError> {
        self.ensure_live()?;
        self.unload(coord);
        Ok(())
    }

    fn unload(&mut self, coord: TileCoord) {
        let Some(state) = self.tiles.get(&coord).map(TileRecord::state) else {
            trace!(source = %self.id, %coord, "Release of unknown tile ignored");
            return;
        };

        match state {
            TileState::Loading => {
                self.requests.abort(coord);
                if let Some(record) = self.tiles.get_mut(&coord) {
                    record.request = None;
                }
                self.transition(coord, TileState::Aborted);
                self.transition(coord, TileState::Unloaded);
                debug!(source = %self.id, %coord, "Tile load aborted");
            }
            TileState::Loaded => {
                let texture = self.tiles.get_mut(&coord).and_then(|record| {
                    record.dem = None;
                    record.texture.take()
                });
                if let Some(handle) = texture {
                    if let Err(err) = self.pool.release(handle) {
                        error!(source = %self.id, %coord, %handle, error = %err, "Texture release failed");
                    }
                }
                self.transition(coord, TileState::Unloaded);
                debug!(source = %self.id, %coord, "Tile unloaded");
            }
            TileState::Idle | TileState::Errored => {
                if let Some(record) = self.tiles.get_mut(&coord) {
                    record.error = None;
                }
                self.transition(coord, TileState::Unloaded);
            }
            TileState::Aborted | TileState::Unloaded => {}
        }
    }

    /// Drop the records of unloaded tiles. Returns how many were removed.
    pub fn forget_unloaded(&mut self) -> usize {
        let before = self.tiles.len();
        self.tiles.retain(|_, record| record.state != TileState::Unloaded);
        before - self.tiles.len()
    }

    // -------------------------------------------------------------------------
    // Completions
    // -------------------------------------------------------------------------

    /// Wait for the next fetch to finish and apply it.
    ///
    /// Returns the coordinate that changed, or `None` when nothing is loading.
    pub async fn next_update(&mut self) -> Option<TileCoord> {
        let completion = self.requests.next_completion().await?;
        let coord = completion.coord;
        self.handle_completion(completion);
        Some(coord)
    }

    /// Apply every completion that has already arrived, without waiting.
    pub fn poll_completions(&mut self) -> usize {
        let mut handled = 0;
        while let Some(completion) = self.requests.try_next_completion() {
            self.handle_completion(completion);
            handled += 1;
        }
        handled
    }

    /// Wait until no tile is loading. Returns the number of completions applied.
    pub async fn run_until_idle(&mut self) -> usize {
        let mut handled = 0;
        while self.next_update().await.is_some() {
            handled += 1;
        }
        handled
    }

    /// Apply one fetch result to its tile.
    ///
    /// Results for tiles that are no longer loading under the same request are
    /// discarded.
    fn handle_completion(&mut self, completion: Completion) {
        let Completion { coord, id, outcome } = completion;

        let current = self.tiles.get(&coord).and_then(TileRecord::request);
        if self.torn_down || current != Some(id) {
            trace!(source = %self.id, %coord, %id, "Discarding completion for inactive request");
            return;
        }

        if let Some(record) = self.tiles.get_mut(&coord) {
            record.request = None;
        }

        let result = outcome.and_then(|image| self.bind_texture(&image));
        match result {
            Ok((handle, dem)) => {
                if let Some(record) = self.tiles.get_mut(&coord) {
                    record.texture = Some(handle);
                    record.dem = dem;
                }
                self.transition(coord, TileState::Loaded);
                debug!(source = %self.id, %coord, %handle, "Tile loaded");
                self.emit(SourceEvent::TileLoaded(coord));
            }
            Err(err) => self.fail_tile(coord, err),
        }
    }

    /// Build the pyramid if needed, then acquire and fill a texture.
    fn bind_texture(
        &mut self,
        image: &DecodedImage,
    ) -> Result<(TextureHandle, Option<Arc<DemPyramid>>), TileError> {
        if self.descriptor.is_elevation() {
            let encoding = self.descriptor.encoding.encoding();
            let pyramid = DemPyramid::build(image, encoding)?;
            let base = pyramid.base();
            let pixels = base.to_rgba(encoding);
            let handle = self.upload(&pixels, base.width(), base.height())?;
            trace!(source = %self.id, levels = pyramid.level_count(), "Built elevation pyramid");
            Ok((handle, Some(Arc::new(pyramid))))
        } else {
            let handle = self.upload(&image.pixels, image.width, image.height)?;
            Ok((handle, None))
        }
    }

    fn upload(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<TextureHandle, TileError> {
        let handle = self.pool.acquire_or_reuse(SizeClass::for_width(width));
        if let Err(err) = self.pool.upload(handle, pixels, width, height) {
            let _ = self.pool.release(handle);
            return Err(err);
        }
        Ok(handle)
    }

    fn fail_tile(&mut self, coord: TileCoord, err: TileError) {
        if let Some(record) = self.tiles.get_mut(&coord) {
            record.error = Some(err.clone());
        }
        self.transition(coord, TileState::Errored);
        warn!(source = %self.id, %coord, error = %err, "Tile failed to load");
        self.emit(SourceEvent::TileErrored(coord, err));
    }

    // -------------------------------------------------------------------------
    // Teardown
    // -------------------------------------------------------------------------

    /// Abort every load, unload every tile and destroy pooled textures.
    ///
    /// All later operations return [`SourceError::TornDown`].
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }

        let coords: Vec<TileCoord> = self.tiles.keys().copied().collect();
        for coord in coords {
            self.unload(coord);
        }
        self.requests.abort_all();
        self.pool.destroy_all();
        self.torn_down = true;

        info!(source = %self.id, tiles = self.tiles.len(), "Source torn down");
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Descriptive snapshot of the source.
    pub fn serialize(&self) -> SourceSnapshot {
        self.descriptor.snapshot()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    pub fn descriptor_state(&self) -> &DescriptorState {
        &self.descriptor_state
    }

    pub fn tile(&self, coord: TileCoord) -> Option<&TileRecord> {
        self.tiles.get(&coord)
    }

    pub fn tile_state(&self, coord: TileCoord) -> Option<TileState> {
        self.tiles.get(&coord).map(TileRecord::state)
    }

    /// All tile records.
    pub fn tiles(&self) -> impl Iterator<Item = (&TileCoord, &TileRecord)> {
        self.tiles.iter()
    }

    /// Number of tiles with a fetch in flight.
    pub fn loading_count(&self) -> usize {
        self.requests.pending()
    }

    pub fn pool(&self) -> &TexturePool<B> {
        &self.pool
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn ensure_live(&self) -> Result<(), SourceError> {
        if self.torn_down {
            Err(SourceError::TornDown)
        } else {
            Ok(())
        }
    }

    fn ensure_descriptor(&self) -> Result<(), SourceError> {
        match &self.descriptor_state {
            DescriptorState::Ready => Ok(()),
            DescriptorState::Pending => Err(SourceError::NotReady),
            DescriptorState::Failed(err) => Err(SourceError::DescriptorUnavailable(err.clone())),
        }
    }

    fn tile_url(&self, coord: TileCoord) -> Result<String, TileError> {
        let descriptor = &self.descriptor;
        let url = resolve_tile_url(
            coord,
            &descriptor.tiles,
            descriptor.scheme,
            self.url_options.pixel_ratio,
        )
        .ok_or_else(|| TileError::Protocol("source has no tile URL templates".to_string()))?;

        Ok(normalize_tile_url(
            &url,
            descriptor.url.as_deref(),
            descriptor.tile_size,
            &self.url_options,
        )?)
    }

    fn transition(&mut self, coord: TileCoord, next: TileState) {
        if let Some(record) = self.tiles.get_mut(&coord) {
            debug_assert!(
                record.state.can_transition_to(next),
                "illegal tile transition {} -> {} for {}",
                record.state,
                next,
                coord
            );
            trace!(source = %self.id, %coord, from = %record.state, to = %next, "Tile transition");
            record.state = next;
        }
    }

    fn emit(&self, event: SourceEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl<B: RenderBackend> Drop for TileManager<B> {
    fn drop(&mut self) {
        self.requests.abort_all();
    }
}

// =============================================================================
// Tests
// =============================================================================
