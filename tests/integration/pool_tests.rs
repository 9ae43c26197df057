//! Texture pool integration tests.
//!
//! Tests verify:
//! - Released handles are reused for tiles of the same size class
//! - Different size classes never share handles
//! - Unloading never destroys textures unless an idle bound is configured

use std::sync::Arc;

use raster_tile_source::dem::{DemEncodingKind, MapboxTerrainRgb};
use raster_tile_source::source::SourceDescriptor;
use raster_tile_source::texture::{HeadlessBackend, SizeClass, TexturePool};
use raster_tile_source::tile::{ManagerOptions, TileCoord, TileManager};

use super::test_utils::{dem_png, solid_png, MockFetcher, TEMPLATE};

// =============================================================================
// Pool Reuse
// =============================================================================

#[test]
fn test_release_then_acquire_returns_same_handle() {
    let mut pool = TexturePool::new(HeadlessBackend::new());
    let class = SizeClass::for_width(256);

    let first = pool.acquire_or_reuse(class);
    pool.release(first).unwrap();
    let second = pool.acquire_or_reuse(class);

    assert_eq!(first, second);
    assert_eq!(pool.allocations(), 1);
    assert_eq!(pool.reuses(), 1);
    assert_eq!(pool.backend().created(), 1);
}

#[test]
fn test_size_classes_do_not_mix() {
    let mut pool = TexturePool::new(HeadlessBackend::new());

    let small = pool.acquire_or_reuse(SizeClass::for_width(256));
    pool.release(small).unwrap();
    let large = pool.acquire_or_reuse(SizeClass::for_width(512));

    assert_ne!(small, large);
    assert!(pool.is_idle(small));
    assert_eq!(pool.allocations(), 2);
}

#[test]
fn test_double_release_is_rejected() {
    let mut pool = TexturePool::new(HeadlessBackend::new());
    let handle = pool.acquire_or_reuse(SizeClass::for_width(64));

    pool.release(handle).unwrap();
    assert!(pool.release(handle).is_err());
    assert_eq!(pool.idle_count(), 1);
}

// =============================================================================
// Reuse Through the Lifecycle Manager
// =============================================================================

#[tokio::test]
async fn test_unloaded_tile_texture_is_reused_by_next_tile() {
    let fetcher = Arc::new(MockFetcher::new(solid_png(256, 256)));
    let mut manager = TileManager::new(
        "imagery",
        SourceDescriptor::raster(vec![TEMPLATE.to_string()]),
        fetcher,
        HeadlessBackend::new(),
    );

    let first = TileCoord::new(4, 1, 1);
    manager.request_tile(first).unwrap();
    manager.run_until_idle().await;
    let handle = manager.tile(first).unwrap().texture().unwrap();
    manager.release_tile(first).unwrap();

    let second = TileCoord::new(4, 2, 1);
    manager.request_tile(second).unwrap();
    manager.run_until_idle().await;

    assert_eq!(manager.tile(second).unwrap().texture(), Some(handle));
    assert_eq!(manager.pool().allocations(), 1);
    assert_eq!(manager.pool().reuses(), 1);

    // Content was overwritten in place
    assert_eq!(manager.pool().backend().upload_count(), 2);
}

#[tokio::test]
async fn test_odd_sized_elevation_tile_rounds_up_size_class() {
    let body = dem_png(300, 300, &MapboxTerrainRgb, |_, _| 0.0);
    let fetcher = Arc::new(MockFetcher::new(body));
    let mut manager = TileManager::new(
        "terrain",
        SourceDescriptor::raster_dem(vec![TEMPLATE.to_string()], DemEncodingKind::Mapbox),
        fetcher,
        HeadlessBackend::new(),
    );
    let coord = TileCoord::new(1, 0, 0);

    manager.request_tile(coord).unwrap();
    manager.run_until_idle().await;

    let record = manager.tile(coord).unwrap();
    let handle = record.texture().unwrap();
    assert_eq!(manager.pool().backend().size_of(handle).unwrap().edge(), 512);

    let upload = manager.pool().backend().last_upload(handle).unwrap();
    assert_eq!((upload.width, upload.height), (300, 300));
    assert_eq!(upload.pixels.len(), 300 * 300 * 4);

    // 300 -> 150 -> 75 -> 37 -> 18 -> 9 -> 4 -> 2 -> 1
    assert_eq!(record.dem().unwrap().level_count(), 9);
}

#[tokio::test]
async fn test_configured_idle_bound_evicts_oldest() {
    let fetcher = Arc::new(MockFetcher::new(solid_png(64, 64)));
    let mut manager = TileManager::with_options(
        "imagery",
        SourceDescriptor::raster(vec![TEMPLATE.to_string()]),
        fetcher,
        HeadlessBackend::new(),
        ManagerOptions {
            max_idle_textures: Some(2),
            ..ManagerOptions::default()
        },
    );

    let coords: Vec<TileCoord> = (0..5).map(|x| TileCoord::new(3, x, 0)).collect();
    for coord in &coords {
        manager.request_tile(*coord).unwrap();
    }
    manager.run_until_idle().await;
    assert_eq!(manager.pool().live_count(), 5);

    for coord in &coords {
        manager.release_tile(*coord).unwrap();
    }

    assert_eq!(manager.pool().idle_count(), 2);
    assert_eq!(manager.pool().backend().destroyed(), 3);
    assert_eq!(manager.pool().backend().live_textures(), 2);
}

#[tokio::test]
async fn test_default_unload_never_destroys_textures() {
    let fetcher = Arc::new(MockFetcher::new(solid_png(64, 64)));
    let mut manager = TileManager::new(
        "imagery",
        SourceDescriptor::raster(vec![TEMPLATE.to_string()]),
        fetcher,
        HeadlessBackend::new(),
    );

    let coords: Vec<TileCoord> = (0..80).map(|x| TileCoord::new(7, x, 0)).collect();
    for coord in &coords {
        manager.request_tile(*coord).unwrap();
    }
    manager.run_until_idle().await;
    for coord in &coords {
        manager.release_tile(*coord).unwrap();
    }

    assert_eq!(manager.pool().idle_count(), 80);
    assert_eq!(manager.pool().backend().destroyed(), 0);

    // Teardown is the only place textures are freed
    manager.teardown();
    assert_eq!(manager.pool().backend().destroyed(), 80);
}
