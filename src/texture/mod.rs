//! GPU texture management.
//!
//! # Components
//!
//! - [`RenderBackend`]: the three GPU calls the pool needs (create, upload, destroy)
//! - [`TexturePool`]: bounded, size-classed reuse of texture handles
//! - [`HeadlessBackend`]: in-memory backend for tools and tests
//!
//! The pool holds no pixel data, only handle identity and size class.

mod backend;
mod pool;

pub use backend::{HeadlessBackend, RenderBackend, SizeClass, TextureHandle, UploadRecord};
pub use pool::TexturePool;
