//! Per-tile state record.

use std::fmt;
use std::sync::Arc;

use crate::dem::DemPyramid;
use crate::error::TileError;
use crate::texture::TextureHandle;

use super::request::RequestId;

/// Lifecycle state of one tile.
///
/// ```text
///          request              success
///   Idle ──────────▶ Loading ──────────▶ Loaded ───┐
///    ▲  ▲               │  │                       │ release
///    │  │ retry  failure│  │ release               ▼
///    │  └──── Errored ◀─┘  └──▶ Aborted ──────▶ Unloaded
///    │                                             │
///    └─────────────────────────────────────────────┘
///                         request
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileState {
    Idle,
    Loading,
    Loaded,
    Errored,
    /// Transient; collapses to `Unloaded` in the same call
    Aborted,
    Unloaded,
}

impl TileState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: TileState) -> bool {
        use TileState::*;
        matches!(
            (self, next),
            (Idle, Loading)
                | (Idle, Unloaded)
                | (Loading, Loaded)
                | (Loading, Errored)
                | (Loading, Aborted)
                | (Aborted, Unloaded)
                | (Loaded, Unloaded)
                | (Errored, Idle)
                | (Errored, Unloaded)
                | (Unloaded, Idle)
        )
    }
}

impl fmt::Display for TileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TileState::Idle => "idle",
            TileState::Loading => "loading",
            TileState::Loaded => "loaded",
            TileState::Errored => "errored",
            TileState::Aborted => "aborted",
            TileState::Unloaded => "unloaded",
        };
        f.write_str(name)
    }
}

/// Everything the manager owns for one tile.
///
/// Fields are only mutated by the lifecycle manager; callers get read access.
#[derive(Debug, Clone)]
pub struct TileRecord {
    pub(super) state: TileState,
    pub(super) request: Option<RequestId>,
    pub(super) texture: Option<TextureHandle>,
    pub(super) dem: Option<Arc<DemPyramid>>,
    pub(super) error: Option<TileError>,
}

impl TileRecord {
    pub(super) fn new() -> Self {
        Self {
            state: TileState::Idle,
            request: None,
            texture: None,
            dem: None,
            error: None,
        }
    }

    pub fn state(&self) -> TileState {
        self.state
    }

    /// In-flight request, present only while `Loading`.
    pub fn request(&self) -> Option<RequestId> {
        self.request
    }

    /// Bound texture, present only while `Loaded`.
    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    /// Elevation pyramid for tiles of elevation sources.
    pub fn dem(&self) -> Option<&Arc<DemPyramid>> {
        self.dem.as_ref()
    }

    /// Last failure, present only while `Errored`.
    pub fn error(&self) -> Option<&TileError> {
        self.error.as_ref()
    }

    /// Check the ownership invariant for the current state.
    pub fn is_consistent(&self) -> bool {
        let request_ok = self.request.is_some() == (self.state == TileState::Loading);
        let texture_ok = self.texture.is_some() == (self.state == TileState::Loaded);
        let dem_ok = self.dem.is_none() || self.state == TileState::Loaded;
        let error_ok = self.error.is_some() == (self.state == TileState::Errored);
        request_ok && texture_ok && dem_ok && error_ok
    }
}
