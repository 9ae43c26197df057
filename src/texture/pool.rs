//! Size-classed GPU texture pool.
//!
//! Tiles of the same pixel size can share texture storage over time: when a
//! tile unloads its handle goes back to the pool, and the next tile of the
//! same size class overwrites it in place instead of allocating a new one.
//!
//! # Idle Set
//!
//! Released handles are kept until [`TexturePool::destroy_all`] at teardown;
//! an ordinary unload never destroys a texture. A pool built with
//! [`TexturePool::with_max_idle`] opts into a bound instead: once more than
//! `max_idle` handles are idle, the least-recently released one is destroyed
//! through the backend.

use std::collections::HashMap;

use lru::LruCache;
use tracing::{debug, trace, warn};

use crate::error::TileError;

use super::backend::{RenderBackend, SizeClass, TextureHandle};

// =============================================================================
// Texture Pool
// =============================================================================

/// Pool of reusable GPU textures keyed by [`SizeClass`].
///
/// A handle is either *live* (bound to a loaded tile) or *idle* (available for
/// reuse), never both.
///
/// # Example
///
/// ```
/// use raster_tile_source::texture::{HeadlessBackend, SizeClass, TexturePool};
///
/// let mut pool = TexturePool::new(HeadlessBackend::new());
///
/// let first = pool.acquire_or_reuse(SizeClass::for_width(256));
/// pool.release(first).unwrap();
///
/// // Same size class comes back as the same handle
/// let second = pool.acquire_or_reuse(SizeClass::for_width(256));
/// assert_eq!(first, second);
/// assert_eq!(pool.allocations(), 1);
/// ```
pub struct TexturePool<B: RenderBackend> {
    /// Backend that owns the actual GPU objects
    backend: B,

    /// Released handles, most recently released first
    idle: LruCache<TextureHandle, SizeClass>,

    /// Handles currently bound to tiles
    live: HashMap<TextureHandle, SizeClass>,

    /// Optional bound on idle handles
    max_idle: Option<usize>,

    allocations: usize,
    reuses: usize,
}

impl<B: RenderBackend> TexturePool<B> {
    /// Create a pool that keeps every released handle until teardown.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            idle: LruCache::unbounded(),
            live: HashMap::new(),
            max_idle: None,
            allocations: 0,
            reuses: 0,
        }
    }

    /// Create a pool that keeps at most `max_idle` released handles,
    /// destroying the least-recently released one on overflow.
    pub fn with_max_idle(backend: B, max_idle: usize) -> Self {
        Self {
            max_idle: Some(max_idle),
            ..Self::new(backend)
        }
    }

    /// Get a handle for `size`, reusing an idle one when available.
    ///
    /// A reused handle keeps its old contents until the caller uploads.
    pub fn acquire_or_reuse(&mut self, size: SizeClass) -> TextureHandle {
        let reusable = self
            .idle
            .iter()
            .find(|(_, class)| **class == size)
            .map(|(handle, _)| *handle);

        let handle = match reusable {
            Some(handle) => {
                self.idle.pop(&handle);
                self.reuses += 1;
                trace!(%handle, %size, "Reusing pooled texture");
                handle
            }
            None => {
                let handle = self.backend.create_texture(size);
                self.allocations += 1;
                debug!(%handle, %size, "Allocated new texture");
                handle
            }
        };

        self.live.insert(handle, size);
        handle
    }

    /// Return a live handle to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::Protocol`] if the handle is already idle or was
    /// never acquired from this pool.
    pub fn release(&mut self, handle: TextureHandle) -> Result<(), TileError> {
        if self.idle.contains(&handle) {
            return Err(TileError::Protocol(format!(
                "texture {} released twice",
                handle
            )));
        }

        let size = self.live.remove(&handle).ok_or_else(|| {
            TileError::Protocol(format!("texture {} does not belong to this pool", handle))
        })?;

        self.idle.put(handle, size);
        trace!(%handle, %size, idle = self.idle.len(), "Texture returned to pool");

        let Some(max_idle) = self.max_idle else {
            return Ok(());
        };
        while self.idle.len() > max_idle {
            if let Some((evicted, evicted_size)) = self.idle.pop_lru() {
                debug!(handle = %evicted, size = %evicted_size, "Destroying surplus idle texture");
                self.backend.destroy_texture(evicted);
            } else {
                break;
            }
        }

        Ok(())
    }

    /// Overwrite a live handle's contents.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::Protocol`] if the handle is not live.
    pub fn upload(
        &mut self,
        handle: TextureHandle,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<(), TileError> {
        if !self.live.contains_key(&handle) {
            return Err(TileError::Protocol(format!(
                "upload into texture {} which is not bound to a tile",
                handle
            )));
        }
        self.backend.bind_and_upload(handle, pixels, width, height);
        Ok(())
    }

    /// Destroy every texture the pool knows about.
    ///
    /// Live handles should have been released first; any that remain are
    /// destroyed as well and reported.
    pub fn destroy_all(&mut self) {
        if !self.live.is_empty() {
            warn!(live = self.live.len(), "Destroying pool with textures still bound");
        }
        while let Some((handle, _)) = self.idle.pop_lru() {
            self.backend.destroy_texture(handle);
        }
        for (handle, _) in self.live.drain() {
            self.backend.destroy_texture(handle);
        }
    }

    /// Whether `handle` is currently bound to a tile.
    pub fn is_live(&self, handle: TextureHandle) -> bool {
        self.live.contains_key(&handle)
    }

    /// Whether `handle` is waiting for reuse.
    pub fn is_idle(&self, handle: TextureHandle) -> bool {
        self.idle.contains(&handle)
    }

    /// Number of textures created through the backend.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// Number of acquisitions satisfied from the idle set.
    pub fn reuses(&self) -> usize {
        self.reuses
    }

    /// Number of idle handles.
    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Number of handles bound to tiles.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Bound on idle handles, if eviction is enabled.
    pub fn max_idle(&self) -> Option<usize> {
        self.max_idle
    }

    /// The underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

// =============================================================================
// Tests
// =============================================================================
