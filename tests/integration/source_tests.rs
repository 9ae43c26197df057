//! Source descriptor integration tests.
//!
//! Tests verify:
//! - TileJSON sources load once and enrich the descriptor
//! - `mapbox://` sources produce normalized, token-bearing URLs
//! - Descriptor failures halt tile requests until replaced
//! - Addressing options (TMS, multiple templates, zoom range)

use std::sync::Arc;

use serde_json::json;

use raster_tile_source::error::{DescriptorError, SourceError};
use raster_tile_source::source::{Scheme, SourceDescriptor, SourceType, TileJson, UrlOptions};
use raster_tile_source::texture::HeadlessBackend;
use raster_tile_source::tile::{
    DescriptorState, ManagerOptions, SourceEvent, TileCoord, TileManager, TileState,
};

use super::test_utils::{drain_events, solid_png, MockFetcher, MockProvider, TEMPLATE};

fn manager_for(
    descriptor: SourceDescriptor,
    fetcher: Arc<MockFetcher>,
    url_options: UrlOptions,
) -> TileManager<HeadlessBackend> {
    TileManager::with_options(
        "source",
        descriptor,
        fetcher,
        HeadlessBackend::new(),
        ManagerOptions {
            url_options,
            ..ManagerOptions::default()
        },
    )
}

// =============================================================================
// TileJSON
// =============================================================================

#[tokio::test]
async fn test_mapbox_source_loads_tilejson_and_tiles() {
    let fetcher = Arc::new(MockFetcher::new(solid_png(512, 512)));
    let options = UrlOptions {
        access_token: Some("pk.integration".to_string()),
        ..UrlOptions::default()
    };
    let mut manager = manager_for(
        SourceDescriptor::from_url(SourceType::Raster, "mapbox://mapbox.satellite"),
        fetcher.clone(),
        options,
    );
    let mut events = manager.subscribe();

    let provider = MockProvider::new(Ok(TileJson {
        tiles: vec!["https://a.tiles.mapbox.com/v4/mapbox.satellite/{z}/{x}/{y}.png".to_string()],
        minzoom: Some(0),
        maxzoom: Some(19),
        ..TileJson::default()
    }));
    manager.load_descriptor(&provider).await.unwrap();

    assert_eq!(
        provider.requests(),
        vec!["https://api.mapbox.com/v4/mapbox.satellite.json?secure&access_token=pk.integration".to_string()]
    );
    assert!(matches!(manager.descriptor_state(), DescriptorState::Ready));
    assert_eq!(manager.descriptor().maxzoom, 19);

    let coord = TileCoord::new(2, 1, 3);
    manager.request_tile(coord).unwrap();
    manager.run_until_idle().await;

    assert_eq!(manager.tile_state(coord), Some(TileState::Loaded));
    assert_eq!(
        fetcher.requests(),
        vec!["https://api.mapbox.com/v4/mapbox.satellite/2/1/3@2x.png?access_token=pk.integration".to_string()]
    );

    let events = drain_events(&mut events);
    assert!(matches!(
        events.as_slice(),
        [
            SourceEvent::DataLoading,
            SourceEvent::SourceDataChanged,
            SourceEvent::SourceLoaded,
            SourceEvent::TileLoaded(_)
        ]
    ));
}

#[tokio::test]
async fn test_descriptor_failure_is_reported_once_and_halts_tiles() {
    let fetcher = Arc::new(MockFetcher::new(solid_png(8, 8)));
    let mut manager = manager_for(
        SourceDescriptor::from_url(SourceType::Raster, "https://meta.test/tiles.json"),
        fetcher.clone(),
        UrlOptions::default(),
    );
    let mut events = manager.subscribe();
    let provider = MockProvider::new(Err(DescriptorError::Parse("unexpected EOF".to_string())));

    let result = manager.load_descriptor(&provider).await;
    assert!(matches!(result, Err(SourceError::DescriptorUnavailable(_))));

    let errors = drain_events(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SourceEvent::Error(_)))
        .count();
    assert_eq!(errors, 1);

    let coord = TileCoord::new(0, 0, 0);
    assert!(matches!(
        manager.request_tile(coord),
        Err(SourceError::DescriptorUnavailable(DescriptorError::Parse(_)))
    ));
    assert_eq!(fetcher.request_count(), 0);

    // A new descriptor lifts the halt
    manager
        .set_descriptor(SourceDescriptor::raster(vec![TEMPLATE.to_string()]))
        .unwrap();
    manager.request_tile(coord).unwrap();
    manager.run_until_idle().await;
    assert_eq!(manager.tile_state(coord), Some(TileState::Loaded));
}

#[tokio::test]
async fn test_requests_before_tilejson_are_not_ready() {
    let fetcher = Arc::new(MockFetcher::new(solid_png(8, 8)));
    let mut manager = manager_for(
        SourceDescriptor::from_url(SourceType::Raster, "https://meta.test/tiles.json"),
        fetcher,
        UrlOptions::default(),
    );

    assert!(matches!(manager.descriptor_state(), DescriptorState::Pending));
    assert!(matches!(
        manager.request_tile(TileCoord::new(0, 0, 0)),
        Err(SourceError::NotReady)
    ));
}

// =============================================================================
// Addressing
// =============================================================================

#[tokio::test]
async fn test_tms_source_inverts_rows() {
    let fetcher = Arc::new(MockFetcher::new(solid_png(8, 8)));
    let mut manager = manager_for(
        SourceDescriptor::raster(vec![TEMPLATE.to_string()]).with_scheme(Scheme::Tms),
        fetcher.clone(),
        UrlOptions::default(),
    );

    manager.request_tile(TileCoord::new(5, 10, 12)).unwrap();
    manager.run_until_idle().await;

    assert_eq!(fetcher.requests(), vec!["https://tiles.test/5/10/19.png".to_string()]);
}

#[tokio::test]
async fn test_templates_are_spread_across_hosts() {
    let fetcher = Arc::new(MockFetcher::new(solid_png(8, 8)));
    let mut manager = manager_for(
        SourceDescriptor::raster(vec![
            "https://a.test/{z}/{x}/{y}.png".to_string(),
            "https://b.test/{z}/{x}/{y}.png".to_string(),
        ]),
        fetcher.clone(),
        UrlOptions::default(),
    );

    manager.request_tile(TileCoord::new(2, 0, 0)).unwrap();
    manager.run_until_idle().await;
    manager.request_tile(TileCoord::new(2, 0, 1)).unwrap();
    manager.run_until_idle().await;

    assert_eq!(
        fetcher.requests(),
        vec![
            "https://a.test/2/0/0.png".to_string(),
            "https://b.test/2/0/1.png".to_string()
        ]
    );
}

#[tokio::test]
async fn test_zoom_outside_range_is_rejected() {
    let fetcher = Arc::new(MockFetcher::new(solid_png(8, 8)));
    let mut manager = manager_for(
        SourceDescriptor::raster(vec![TEMPLATE.to_string()]).with_zoom_range(3, 10),
        fetcher.clone(),
        UrlOptions::default(),
    );

    let coord = TileCoord::new(12, 0, 0);
    let err = manager.request_tile(coord).unwrap_err();
    assert!(matches!(err, SourceError::ZoomOutOfRange { minzoom: 3, maxzoom: 10, .. }));
    assert_eq!(err.to_string(), "Tile 12/0/0 outside source zoom range 3..=10");
    assert_eq!(fetcher.request_count(), 0);
}

// =============================================================================
// Serialization
// =============================================================================

#[tokio::test]
async fn test_serialize_describes_source() {
    let fetcher = Arc::new(MockFetcher::new(solid_png(8, 8)));
    let manager = manager_for(
        SourceDescriptor::from_url(SourceType::RasterDem, "mapbox://mapbox.terrain-rgb")
            .with_tile_size(256),
        fetcher,
        UrlOptions::default(),
    );

    let value = serde_json::to_value(manager.serialize()).unwrap();
    assert_eq!(
        value,
        json!({
            "type": "raster-dem",
            "url": "mapbox://mapbox.terrain-rgb",
            "tileSize": 256,
            "encoding": "mapbox"
        })
    );
}
