//! Tile lifecycle integration tests.
//!
//! Tests verify:
//! - Elevation tiles load into pyramids and pooled textures
//! - Releasing a loading tile aborts it without events
//! - Fetch failures are isolated per tile and retryable
//! - A full load/unload cycle leaves nothing owned
//! - Teardown reclaims every resource

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use raster_tile_source::dem::{DemEncodingKind, MapboxTerrainRgb, Terrarium};
use raster_tile_source::error::{FetchError, SourceError, TileError};
use raster_tile_source::source::SourceDescriptor;
use raster_tile_source::texture::{HeadlessBackend, SizeClass};
use raster_tile_source::tile::{SourceEvent, TileCoord, TileManager, TileState};

use super::test_utils::{dem_png, drain_events, solid_png, MockFetcher, TEMPLATE};

fn raster_manager(fetcher: Arc<MockFetcher>) -> TileManager<HeadlessBackend> {
    TileManager::new(
        "imagery",
        SourceDescriptor::raster(vec![TEMPLATE.to_string()]),
        fetcher,
        HeadlessBackend::new(),
    )
}

fn dem_manager(fetcher: Arc<MockFetcher>, encoding: DemEncodingKind) -> TileManager<HeadlessBackend> {
    TileManager::new(
        "terrain",
        SourceDescriptor::raster_dem(vec![TEMPLATE.to_string()], encoding),
        fetcher,
        HeadlessBackend::new(),
    )
}

// =============================================================================
// Successful Loads
// =============================================================================

#[tokio::test]
async fn test_elevation_tile_loads_with_full_pyramid() {
    let body = dem_png(256, 256, &MapboxTerrainRgb, |x, y| (x + y) as f32);
    let fetcher = Arc::new(MockFetcher::new(body));
    let mut manager = dem_manager(fetcher.clone(), DemEncodingKind::Mapbox);
    let mut events = manager.subscribe();
    let coord = TileCoord::new(5, 10, 12);

    manager.request_tile(coord).unwrap();
    manager.run_until_idle().await;

    let record = manager.tile(coord).unwrap();
    assert_eq!(record.state(), TileState::Loaded);
    assert!(record.request().is_none());

    let dem = record.dem().unwrap();
    assert_eq!(dem.level_count(), 9);
    let sizes: Vec<(u32, u32)> = dem.levels().iter().map(|l| (l.width(), l.height())).collect();
    assert_eq!(
        sizes,
        vec![(256, 256), (128, 128), (64, 64), (32, 32), (16, 16), (8, 8), (4, 4), (2, 2), (1, 1)]
    );
    assert!((dem.base().get(3, 4).unwrap() - 7.0).abs() < 0.01);

    let handle = record.texture().unwrap();
    assert_eq!(manager.pool().allocations(), 1);
    assert_eq!(manager.pool().live_count(), 1);
    assert_eq!(manager.pool().backend().size_of(handle), Some(SizeClass::for_width(256)));
    assert_eq!(SizeClass::for_width(256).edge(), 256);

    assert_eq!(fetcher.requests(), vec!["https://tiles.test/5/10/12.png".to_string()]);

    let events = drain_events(&mut events);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], SourceEvent::TileLoaded(c) if c == coord));
}

#[tokio::test]
async fn test_terrarium_tile_decodes_with_its_encoding() {
    let body = dem_png(4, 4, &Terrarium, |_, _| -120.0);
    let fetcher = Arc::new(MockFetcher::new(body));
    let mut manager = dem_manager(fetcher, DemEncodingKind::Terrarium);
    let coord = TileCoord::new(2, 1, 1);

    manager.request_tile(coord).unwrap();
    manager.run_until_idle().await;

    let dem = manager.tile(coord).unwrap().dem().unwrap().clone();
    assert!(dem.base().data().iter().all(|v| *v == -120.0));
    assert_eq!(dem.level_count(), 3);
}

#[tokio::test]
async fn test_round_trip_leaves_nothing_owned() {
    let body = dem_png(16, 16, &MapboxTerrainRgb, |_, _| 42.0);
    let fetcher = Arc::new(MockFetcher::new(body));
    let mut manager = dem_manager(fetcher, DemEncodingKind::Mapbox);
    let coord = TileCoord::new(3, 3, 3);

    assert!(manager.tile(coord).is_none());
    manager.request_tile(coord).unwrap();
    assert_eq!(manager.tile_state(coord), Some(TileState::Loading));
    manager.run_until_idle().await;
    assert_eq!(manager.tile_state(coord), Some(TileState::Loaded));

    let handle = manager.tile(coord).unwrap().texture().unwrap();
    manager.release_tile(coord).unwrap();

    let record = manager.tile(coord).unwrap();
    assert_eq!(record.state(), TileState::Unloaded);
    assert!(record.request().is_none());
    assert!(record.texture().is_none());
    assert!(record.dem().is_none());
    assert!(record.is_consistent());

    // Returned to the pool, not destroyed
    assert!(manager.pool().is_idle(handle));
    assert_eq!(manager.pool().backend().destroyed(), 0);
    assert_eq!(manager.pool().live_count(), 0);
}

// =============================================================================
// Abort
// =============================================================================

#[tokio::test]
async fn test_release_before_fetch_resolves() {
    let fetcher = Arc::new(MockFetcher::new(solid_png(8, 8)).gated());
    let mut manager = raster_manager(fetcher.clone());
    let mut events = manager.subscribe();
    let coord = TileCoord::new(4, 2, 2);

    manager.request_tile(coord).unwrap();
    manager.release_tile(coord).unwrap();

    // Let the held response through; it must be discarded
    fetcher.open_gate();
    tokio::time::sleep(Duration::from_millis(20)).await;
    manager.poll_completions();
    manager.run_until_idle().await;

    assert_eq!(manager.tile_state(coord), Some(TileState::Unloaded));
    assert!(manager.tile(coord).unwrap().request().is_none());
    assert_eq!(manager.loading_count(), 0);
    assert_eq!(manager.pool().allocations(), 0);

    let tile_events: Vec<_> = drain_events(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SourceEvent::TileLoaded(_) | SourceEvent::TileErrored(_, _)))
        .collect();
    assert!(tile_events.is_empty());
}

#[tokio::test]
async fn test_abort_twice_matches_abort_once() {
    let once = {
        let fetcher = Arc::new(MockFetcher::new(solid_png(8, 8)).gated());
        let mut manager = raster_manager(fetcher);
        let coord = TileCoord::new(1, 0, 1);
        manager.request_tile(coord).unwrap();
        manager.release_tile(coord).unwrap();
        let record = manager.tile(coord).unwrap().clone();
        (record.state(), record.request(), record.texture(), manager.loading_count())
    };

    let twice = {
        let fetcher = Arc::new(MockFetcher::new(solid_png(8, 8)).gated());
        let mut manager = raster_manager(fetcher);
        let coord = TileCoord::new(1, 0, 1);
        manager.request_tile(coord).unwrap();
        manager.release_tile(coord).unwrap();
        manager.release_tile(coord).unwrap();
        let record = manager.tile(coord).unwrap().clone();
        (record.state(), record.request(), record.texture(), manager.loading_count())
    };

    assert_eq!(once, twice);
    assert_eq!(once.0, TileState::Unloaded);
}

#[tokio::test]
async fn test_rerequest_after_abort_loads_fresh() {
    let fetcher = Arc::new(MockFetcher::new(solid_png(8, 8)).gated());
    let mut manager = raster_manager(fetcher.clone());
    let coord = TileCoord::new(2, 3, 0);

    manager.request_tile(coord).unwrap();
    manager.release_tile(coord).unwrap();
    manager.request_tile(coord).unwrap();
    assert_eq!(manager.tile_state(coord), Some(TileState::Loading));

    fetcher.open_gate();
    assert_eq!(manager.run_until_idle().await, 1);
    assert_eq!(manager.tile_state(coord), Some(TileState::Loaded));
    assert_eq!(manager.pool().live_count(), 1);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_network_failure_marks_tile_errored() {
    let fetcher = Arc::new(MockFetcher::failing(FetchError::Connection(
        "connection reset".to_string(),
    )));
    let mut manager = raster_manager(fetcher);
    let mut events = manager.subscribe();
    let coord = TileCoord::new(6, 20, 30);

    manager.request_tile(coord).unwrap();
    manager.run_until_idle().await;

    let record = manager.tile(coord).unwrap();
    assert_eq!(record.state(), TileState::Errored);
    assert!(record.texture().is_none());
    assert!(matches!(record.error(), Some(TileError::Fetch(FetchError::Connection(_)))));

    let events = drain_events(&mut events);
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], SourceEvent::TileErrored(c, TileError::Fetch(_)) if *c == coord));

    assert_eq!(manager.pool().allocations(), 0);
    assert_eq!(manager.pool().backend().created(), 0);
}

#[tokio::test]
async fn test_failures_are_isolated_between_tiles() {
    let failing_url = "https://tiles.test/3/1/1.png";
    let fetcher = Arc::new(MockFetcher::new(solid_png(8, 8)).with_route(
        failing_url,
        Err(FetchError::Status {
            status: 404,
            url: failing_url.to_string(),
        }),
    ));
    let mut manager = raster_manager(fetcher);

    let bad = TileCoord::new(3, 1, 1);
    let good = TileCoord::new(3, 1, 2);
    manager.request_tile(bad).unwrap();
    manager.request_tile(good).unwrap();
    manager.run_until_idle().await;

    assert_eq!(manager.tile_state(bad), Some(TileState::Errored));
    assert_eq!(manager.tile_state(good), Some(TileState::Loaded));
    assert_eq!(manager.pool().live_count(), 1);
}

#[tokio::test]
async fn test_panicking_fetcher_errors_the_tile() {
    let panic_url = "https://tiles.test/1/0/0.png";
    let fetcher = Arc::new(MockFetcher::new(solid_png(8, 8)).panicking_on(panic_url));
    let mut manager = raster_manager(fetcher);
    let mut events = manager.subscribe();

    let broken = TileCoord::new(1, 0, 0);
    let healthy = TileCoord::new(1, 1, 0);
    manager.request_tile(broken).unwrap();
    manager.request_tile(healthy).unwrap();

    tokio::time::timeout(Duration::from_secs(5), manager.run_until_idle())
        .await
        .expect("run_until_idle should return once every load completes");

    let record = manager.tile(broken).unwrap();
    assert_eq!(record.state(), TileState::Errored);
    assert!(matches!(record.error(), Some(TileError::Fetch(_))));
    assert_eq!(manager.tile_state(healthy), Some(TileState::Loaded));
    assert_eq!(manager.loading_count(), 0);

    let errored = drain_events(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SourceEvent::TileErrored(c, _) if *c == broken))
        .count();
    assert_eq!(errored, 1);
}

#[tokio::test]
async fn test_truncated_elevation_tile_is_a_decode_error() {
    let fetcher = Arc::new(MockFetcher::new(Bytes::from_static(b"\x89PNG\r\n\x1a\ntruncated")));
    let mut manager = dem_manager(fetcher, DemEncodingKind::Mapbox);
    let coord = TileCoord::new(0, 0, 0);

    manager.request_tile(coord).unwrap();
    manager.run_until_idle().await;

    let record = manager.tile(coord).unwrap();
    assert_eq!(record.state(), TileState::Errored);
    assert!(matches!(record.error(), Some(TileError::Decode { .. })));
    assert!(record.dem().is_none());
}

#[tokio::test]
async fn test_errored_tile_retries_on_request() {
    let url = "https://tiles.test/1/0/0.png";
    let fetcher = Arc::new(MockFetcher::failing(FetchError::Timeout(url.to_string())));
    let mut manager = raster_manager(fetcher.clone());
    let coord = TileCoord::new(1, 0, 0);

    manager.request_tile(coord).unwrap();
    manager.run_until_idle().await;
    assert_eq!(manager.tile_state(coord), Some(TileState::Errored));

    manager.request_tile(coord).unwrap();
    assert_eq!(manager.tile_state(coord), Some(TileState::Loading));
    assert!(manager.tile(coord).unwrap().error().is_none());
    manager.run_until_idle().await;

    assert_eq!(fetcher.request_count(), 2);
    assert_eq!(manager.tile_state(coord), Some(TileState::Errored));
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test]
async fn test_teardown_reclaims_everything() {
    let fetcher = Arc::new(MockFetcher::new(solid_png(8, 8)));
    let mut manager = raster_manager(fetcher);

    let coords = [TileCoord::new(2, 0, 0), TileCoord::new(2, 1, 0), TileCoord::new(2, 2, 0)];
    for coord in coords {
        manager.request_tile(coord).unwrap();
    }
    manager.run_until_idle().await;
    manager.release_tile(coords[0]).unwrap();

    let pending = TileCoord::new(2, 3, 3);
    manager.request_tile(pending).unwrap();

    manager.teardown();

    assert!(manager
        .tiles()
        .all(|(_, record)| record.state() == TileState::Unloaded && record.is_consistent()));
    assert_eq!(manager.loading_count(), 0);
    assert_eq!(manager.pool().live_count(), 0);
    assert_eq!(manager.pool().idle_count(), 0);
    assert_eq!(manager.pool().backend().live_textures(), 0);
    assert_eq!(manager.pool().backend().destroyed(), 3);

    assert!(matches!(manager.request_tile(pending), Err(SourceError::TornDown)));
}
