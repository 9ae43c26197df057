//! Tile Request Controller.
//!
//! Issues one cancellable fetch per tile and marshals the result back to the
//! owner of the controller.
//!
//! # Delivery Model
//!
//! ```text
//!   owner task                         spawned task (per load)
//!  ┌───────────────────────┐          ┌────────────────────────────┐
//!  │ load(coord, url) ─────┼─spawn───▶│ select! {                  │
//!  │                       │          │   cancelled() => return,   │
//!  │ abort(coord) ─cancel──┼─────────▶│   fetch + decode => send   │
//!  │                       │          │ }                          │
//!  │ next_completion() ◀───┼──mpsc────┤                            │
//!  └───────────────────────┘          └────────────────────────────┘
//! ```
//!
//! Each load is tagged with a [`RequestId`]. A completion is delivered only if
//! its id still matches the coordinate's in-flight entry, so a result that
//! raced past `abort` is discarded and never surfaces.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

use crate::error::{FetchError, TileError};
use crate::io::ImageFetcher;

use super::coord::TileCoord;
use super::decoder::{DecodedImage, TileDecoder};

/// Identity of one `load` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// Result of one load, delivered exactly once unless the load was aborted.
#[derive(Debug)]
pub struct Completion {
    pub coord: TileCoord,
    pub id: RequestId,
    pub outcome: Result<DecodedImage, TileError>,
}

struct InFlight {
    id: RequestId,
    url: String,
    cancel: CancellationToken,
}

/// Issues and tracks tile fetches.
///
/// Must be used from within a Tokio runtime: `load` spawns tasks.
pub struct RequestController {
    fetcher: Arc<dyn ImageFetcher>,
    decoder: TileDecoder,
    in_flight: HashMap<TileCoord, InFlight>,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
    next_id: u64,
}

impl RequestController {
    /// Create a controller that fetches through `fetcher`.
    pub fn new(fetcher: Arc<dyn ImageFetcher>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            fetcher,
            decoder: TileDecoder::new(),
            in_flight: HashMap::new(),
            tx,
            rx,
            next_id: 0,
        }
    }

    /// Start fetching `url` for `coord`.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::Protocol`] if `coord` already has a request in
    /// flight. This is a caller bug and trips a debug assertion.
    pub fn load(&mut self, coord: TileCoord, url: String) -> Result<RequestId, TileError> {
        if let Some(existing) = self.in_flight.get(&coord) {
            let message = format!(
                "tile {} already has request {} in flight",
                coord, existing.id
            );
            error!(%coord, "{}", message);
            debug_assert!(false, "{}", message);
            return Err(TileError::Protocol(message));
        }

        self.next_id += 1;
        let id = RequestId(self.next_id);
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let decoder = self.decoder.clone();
        let tx = self.tx.clone();
        let task_url = url.clone();

        tokio::spawn(async move {
            // A panicking fetcher surfaces as a JoinError and still completes
            let fetch = tokio::spawn(async move { fetcher.fetch(&task_url).await });
            let fetch_abort = fetch.abort_handle();

            let outcome = tokio::select! {
                _ = task_cancel.cancelled() => {
                    fetch_abort.abort();
                    return;
                }
                outcome = fetch_and_decode(fetch, decoder) => outcome,
            };
            // Receiver only disappears with the controller itself
            let _ = tx.send(Completion { coord, id, outcome });
        });

        trace!(%coord, %id, %url, "Tile request started");
        self.in_flight.insert(coord, InFlight { id, url, cancel });
        Ok(id)
    }

    /// Cancel the in-flight request for `coord`, if any.
    ///
    /// Returns `true` if a request was cancelled; that load is then finished
    /// with the "aborted" outcome and will never deliver a completion.
    /// Calling this again, or on a tile without a request, is a no-op.
    pub fn abort(&mut self, coord: TileCoord) -> bool {
        match self.in_flight.remove(&coord) {
            Some(request) => {
                request.cancel.cancel();
                trace!(%coord, id = %request.id, "Tile request aborted");
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight request.
    pub fn abort_all(&mut self) -> usize {
        let count = self.in_flight.len();
        for (_, request) in self.in_flight.drain() {
            request.cancel.cancel();
        }
        count
    }

    /// Wait for the next live completion.
    ///
    /// Returns `None` immediately when nothing is in flight.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        loop {
            if self.in_flight.is_empty() {
                self.drain_stale();
                return None;
            }
            let completion = self.rx.recv().await?;
            if self.accept(&completion) {
                return Some(completion);
            }
        }
    }

    /// Take the next live completion that has already arrived, without waiting.
    pub fn try_next_completion(&mut self) -> Option<Completion> {
        while let Ok(completion) = self.rx.try_recv() {
            if self.accept(&completion) {
                return Some(completion);
            }
        }
        None
    }

    /// Whether `coord` has a request in flight.
    pub fn is_loading(&self, coord: TileCoord) -> bool {
        self.in_flight.contains_key(&coord)
    }

    /// The URL being fetched for `coord`.
    pub fn request_url(&self, coord: TileCoord) -> Option<&str> {
        self.in_flight.get(&coord).map(|r| r.url.as_str())
    }

    /// Number of requests in flight.
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    /// Clear the in-flight entry if `completion` belongs to it.
    fn accept(&mut self, completion: &Completion) -> bool {
        match self.in_flight.get(&completion.coord) {
            Some(request) if request.id == completion.id => {
                self.in_flight.remove(&completion.coord);
                true
            }
            _ => {
                trace!(coord = %completion.coord, id = %completion.id, "Discarding stale completion");
                false
            }
        }
    }

    fn drain_stale(&mut self) {
        while let Ok(completion) = self.rx.try_recv() {
            trace!(coord = %completion.coord, id = %completion.id, "Discarding stale completion");
        }
    }
}

impl Drop for RequestController {
    fn drop(&mut self) {
        self.abort_all();
    }
}

async fn fetch_and_decode(
    fetch: JoinHandle<Result<Bytes, FetchError>>,
    decoder: TileDecoder,
) -> Result<DecodedImage, TileError> {
    let bytes = fetch
        .await
        .map_err(|e| FetchError::Connection(format!("fetch task failed: {}", e)))??;

    // Decoding is CPU-bound; keep it off the async workers
    tokio::task::spawn_blocking(move || decoder.decode(&bytes))
        .await
        .map_err(|e| TileError::Decode {
            message: format!("decode task failed: {}", e),
        })?
}

// =============================================================================
// Tests
// =============================================================================
