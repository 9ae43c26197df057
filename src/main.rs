//! Raster Tile Source - command-line front end.
//!
//! Drives the tile lifecycle manager against real tile servers, inspects
//! elevation pyramids of local images and resolves tile URLs.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use raster_tile_source::{
    config::{Cli, Command, FetchConfig, PyramidConfig, UrlConfig, DEFAULT_SOURCE_ID},
    dem::DemPyramid,
    io::HttpImageFetcher,
    source::{
        load_tilejson, normalize_tile_url, resolve_tile_url, HttpDescriptorProvider,
    },
    texture::HeadlessBackend,
    tile::{ManagerOptions, SourceEvent, TileDecoder, TileManager, TileState},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Fetch(config) => run_fetch(config).await,
        Command::Pyramid(config) => run_pyramid(config),
        Command::Url(config) => run_url(config).await,
    }
}

// =============================================================================
// Fetch Command
// =============================================================================

async fn run_fetch(config: FetchConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let fetcher = match HttpImageFetcher::with_timeout(Duration::from_secs(config.timeout)) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!("Failed to create HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let options = ManagerOptions {
        max_idle_textures: config.max_idle_textures,
        url_options: config.source.url_options(),
        ..ManagerOptions::default()
    };
    let mut manager = TileManager::with_options(
        DEFAULT_SOURCE_ID,
        config.source.descriptor(),
        Arc::new(fetcher),
        HeadlessBackend::new(),
        options,
    );
    let mut events = manager.subscribe();

    if let Some(ref url) = config.source.url {
        info!("Loading TileJSON from {}", url);
        let provider = match HttpDescriptorProvider::new() {
            Ok(provider) => provider,
            Err(e) => {
                error!("Failed to create HTTP client: {}", e);
                return ExitCode::FAILURE;
            }
        };
        if let Err(e) = manager.load_descriptor(&provider).await {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    }

    for coord in &config.coords {
        if let Err(e) = manager.request_tile(*coord) {
            warn!("Skipping {}: {}", coord, e);
        }
    }

    let completed = manager.run_until_idle().await;
    info!("{} request(s) completed", completed);

    println!("Tiles");
    println!("─────");
    let mut failed = 0;
    for coord in &config.coords {
        let Some(record) = manager.tile(*coord) else {
            println!("  {:<16} not requested", coord.to_string());
            continue;
        };

        match record.state() {
            TileState::Loaded => {
                let texture = record
                    .texture()
                    .map(|handle| handle.to_string())
                    .unwrap_or_default();
                match record.dem() {
                    Some(dem) => println!(
                        "  {:<16} loaded   {} ({} pyramid levels)",
                        coord.to_string(),
                        texture,
                        dem.level_count()
                    ),
                    None => println!("  {:<16} loaded   {}", coord.to_string(), texture),
                }
            }
            TileState::Errored => {
                failed += 1;
                let reason = record.error().map(|e| e.to_string()).unwrap_or_default();
                println!("  {:<16} errored  {}", coord.to_string(), reason);
            }
            state => println!("  {:<16} {}", coord.to_string(), state),
        }
    }

    let mut loaded_events = 0;
    let mut errored_events = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            SourceEvent::TileLoaded(_) => loaded_events += 1,
            SourceEvent::TileErrored(_, _) => errored_events += 1,
            _ => {}
        }
    }
    println!();
    println!("Events: {} loaded, {} errored", loaded_events, errored_events);

    if config.release {
        for coord in &config.coords {
            // Skipped coordinates have no record; release is a no-op for them
            let _ = manager.release_tile(*coord);
        }
    }

    let pool = manager.pool();
    println!(
        "Textures: {} allocated, {} reused, {} live, {} idle",
        pool.allocations(),
        pool.reuses(),
        pool.live_count(),
        pool.idle_count()
    );

    if config.json {
        match serde_json::to_string_pretty(&manager.serialize()) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize source: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    manager.teardown();

    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

// =============================================================================
// Pyramid Command
// =============================================================================

fn run_pyramid(config: PyramidConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let bytes = match std::fs::read(&config.path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error: cannot read {}: {}", config.path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let image = match TileDecoder::new().decode(&bytes) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let pyramid = match DemPyramid::build(&image, config.encoding.encoding()) {
        Ok(pyramid) => pyramid,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!(
        "{} ({}x{}, {} encoding)",
        config.path.display(),
        image.width,
        image.height,
        config.encoding
    );
    println!("═════════════════════════════════");

    for (index, level) in pyramid.levels().iter().enumerate() {
        let data = level.data();
        let min = data.iter().copied().fold(f32::INFINITY, f32::min);
        let max = data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = data.iter().map(|v| f64::from(*v)).sum::<f64>() / data.len() as f64;

        println!(
            "  level {:>2}: {:>5}x{:<5} min {:>9.1}  max {:>9.1}  mean {:>9.1}",
            index,
            level.width(),
            level.height(),
            min,
            max,
            mean
        );

        if config
            .dump_below
            .is_some_and(|edge| level.width() <= edge && level.height() <= edge)
        {
            for row in data.chunks(level.width() as usize) {
                let cells: Vec<String> = row.iter().map(|v| format!("{:.1}", v)).collect();
                println!("      {}", cells.join(" "));
            }
        }
    }

    println!();
    println!("Total: {} level(s)", pyramid.level_count());

    ExitCode::SUCCESS
}

// =============================================================================
// Url Command
// =============================================================================

async fn run_url(config: UrlConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let mut descriptor = config.source.descriptor();
    let url_options = config.source.url_options();

    if descriptor.url.is_some() {
        let provider = match HttpDescriptorProvider::new() {
            Ok(provider) => provider,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        };
        match load_tilejson(&descriptor, &provider, &url_options).await {
            Ok(tilejson) => descriptor.merge_tilejson(tilejson),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    if !descriptor.covers_zoom(config.coord.z) {
        eprintln!(
            "Error: zoom {} outside source range {}..={}",
            config.coord.z, descriptor.minzoom, descriptor.maxzoom
        );
        return ExitCode::FAILURE;
    }

    let Some(template_url) = resolve_tile_url(
        config.coord,
        &descriptor.tiles,
        descriptor.scheme,
        url_options.pixel_ratio,
    ) else {
        eprintln!("Error: source has no tile URL templates");
        return ExitCode::FAILURE;
    };

    match normalize_tile_url(
        &template_url,
        descriptor.url.as_deref(),
        descriptor.tile_size,
        &url_options,
    ) {
        Ok(url) => {
            println!("{}", url);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "raster_tile_source=debug"
    } else {
        "raster_tile_source=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
