//! Tile acquisition and lifecycle.
//!
//! This module turns tile coordinates into GPU-resident textures and reclaims
//! them when tiles leave the viewport.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Viewport / render layer          │
//! └──────────┬──────────────────▲───────────┘
//!            │ request/release  │ SourceEvent
//!            ▼                  │
//! ┌─────────────────────────────────────────┐
//! │              TileManager                │
//! │  ┌──────────────────┐ ┌──────────────┐  │
//! │  │ RequestController│ │ TexturePool  │  │
//! │  │ (fetch + decode) │ │ (GPU handles)│  │
//! │  └──────────────────┘ └──────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │   ImageFetcher  /  RenderBackend        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileManager`]: Owns tile records and drives every state transition
//! - [`RequestController`]: One cancellable fetch per tile, single-fire completion
//! - [`TileDecoder`]: Decodes PNG/JPEG/WebP bytes to RGBA8
//! - [`TileState`] / [`TileRecord`]: Per-tile state and owned resources
//! - [`TileCoord`]: `z/x/y` tile address

mod coord;
mod decoder;
mod manager;
mod request;
mod state;

pub use coord::TileCoord;
pub use decoder::{DecodedImage, TileDecoder, RGBA_CHANNELS};
pub use manager::{
    DescriptorState, ManagerOptions, SourceEvent, TileManager, DEFAULT_EVENT_CAPACITY,
};
pub use request::{Completion, RequestController, RequestId};
pub use state::{TileRecord, TileState};
