//! Rendering backend abstraction.
//!
//! The pool never touches a graphics API directly; it calls a
//! [`RenderBackend`]. A real renderer wraps its GL/wgpu device in this trait,
//! while [`HeadlessBackend`] keeps everything in memory for tools and tests.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;

/// Opaque identity of a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

impl fmt::Display for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tex#{}", self.0)
    }
}

/// Texture bucket keyed by power-of-two edge length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SizeClass(u32);

impl SizeClass {
    /// Size class for a tile of the given pixel width.
    ///
    /// Widths are rounded up to the next power of two; zero maps to 1.
    pub fn for_width(width: u32) -> Self {
        SizeClass(width.max(1).next_power_of_two())
    }

    /// Edge length in pixels.
    pub fn edge(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}px", self.0)
    }
}

/// GPU operations the texture pool depends on.
///
/// All calls happen on the thread that owns the pool and must not block.
pub trait RenderBackend {
    /// Allocate a new square RGBA texture with the given edge length.
    fn create_texture(&mut self, size: SizeClass) -> TextureHandle;

    /// Bind `handle` and overwrite its contents with RGBA8 `pixels`.
    fn bind_and_upload(&mut self, handle: TextureHandle, pixels: &[u8], width: u32, height: u32);

    /// Free a texture. Only called when the pool sheds or tears down handles.
    fn destroy_texture(&mut self, handle: TextureHandle);
}

// =============================================================================
// Headless Backend
// =============================================================================

/// Last upload made into a headless texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub width: u32,
    pub height: u32,
    pub pixels: Bytes,
}

/// In-memory backend that records every call.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: u64,
    textures: HashMap<TextureHandle, SizeClass>,
    uploads: HashMap<TextureHandle, UploadRecord>,
    created: usize,
    destroyed: usize,
    upload_count: usize,
}

impl HeadlessBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of textures created so far.
    pub fn created(&self) -> usize {
        self.created
    }

    /// Number of textures destroyed so far.
    pub fn destroyed(&self) -> usize {
        self.destroyed
    }

    /// Number of uploads performed so far.
    pub fn upload_count(&self) -> usize {
        self.upload_count
    }

    /// Textures currently allocated.
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Size class of a live texture.
    pub fn size_of(&self, handle: TextureHandle) -> Option<SizeClass> {
        self.textures.get(&handle).copied()
    }

    /// Most recent upload into a live texture.
    pub fn last_upload(&self, handle: TextureHandle) -> Option<&UploadRecord> {
        self.uploads.get(&handle)
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_texture(&mut self, size: SizeClass) -> TextureHandle {
        self.next_id += 1;
        let handle = TextureHandle(self.next_id);
        self.textures.insert(handle, size);
        self.created += 1;
        handle
    }

    fn bind_and_upload(&mut self, handle: TextureHandle, pixels: &[u8], width: u32, height: u32) {
        self.upload_count += 1;
        self.uploads.insert(
            handle,
            UploadRecord {
                width,
                height,
                pixels: Bytes::copy_from_slice(pixels),
            },
        );
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        if self.textures.remove(&handle).is_some() {
            self.destroyed += 1;
        }
        self.uploads.remove(&handle);
    }
}
