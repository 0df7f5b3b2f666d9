//! pmtiles-edge - An edge tile server for PMTiles archives.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pmtiles_edge::{
    archive::DirectoryCache,
    config::{Cli, Command, Config, Origin},
    dataset::{check_dataset, DatasetId},
    io::{create_s3_client, ArchiveSource, HttpArchiveSource, S3ArchiveSource},
    server::{create_router, RouterConfig},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: Config) -> ExitCode {
    // Initialize logging
    init_logging(config.verbose);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("pmtiles-edge v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");

    // Auth status with warning if disabled
    if config.auth_enabled {
        info!("  Auth: enabled ({} key(s))", config.api_key_list().len());
    } else {
        warn!("  Auth: DISABLED - all endpoints are publicly accessible");
        warn!("        Enable for production: --auth-enabled=true --api-keys=<keys>");
    }

    if config.directory_cache > 0 {
        info!("  Directory cache: {} entries", config.directory_cache);
    } else {
        info!("  Directory cache: disabled");
    }

    match config.origin() {
        Some(Origin::Http { url }) => {
            info!("  Origin: {}", url);
            match http_origin(&config, &url) {
                Ok(archives) => serve(archives, &config).await,
                Err(code) => code,
            }
        }
        Some(Origin::S3 {
            bucket,
            endpoint,
            region,
        }) => {
            info!("  S3 bucket: {}", bucket);
            if let Some(ref endpoint) = endpoint {
                info!("  S3 endpoint: {}", endpoint);
            }
            info!("  S3 region: {}", region);
            let client = create_s3_client(endpoint.as_deref(), &region).await;
            let archives = S3ArchiveSource::new(client, bucket, config.archive_prefix.clone());
            serve(archives, &config).await
        }
        None => {
            error!("Configuration error: no origin configured");
            ExitCode::FAILURE
        }
    }
}

async fn serve<A>(archives: A, config: &Config) -> ExitCode
where
    A: ArchiveSource + 'static,
{
    let router = create_router(archives, build_router_config(config));

    // Bind and serve
    let addr = config.bind_address();

    info!("");
    info!("  Server listening on: http://{}", addr);
    info!("  Datasets: {}", DatasetId::names().join(", "));
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn http_origin(config: &Config, url: &str) -> Result<HttpArchiveSource, ExitCode> {
    HttpArchiveSource::new(
        url,
        config.archive_prefix.clone(),
        config.origin_timeout(),
        config.origin_retry,
    )
    .map_err(|e| {
        error!("Failed to create origin client: {}", e);
        ExitCode::FAILURE
    })
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "pmtiles_edge=debug,tower_http=debug"
    } else {
        "pmtiles_edge=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = if config.auth_enabled {
        RouterConfig::new(config.api_key_list())
    } else {
        RouterConfig::without_auth()
    };

    if let Some(ref public_url) = config.public_url {
        router_config = router_config.with_public_url(public_url.clone());
    }

    router_config
        .with_directory_cache(DirectoryCache::with_capacity(config.directory_cache))
        .with_tracing(!config.no_tracing)
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: Config) -> ExitCode {
    // Initialize minimal logging for check command
    if config.verbose {
        init_logging(true);
    }

    println!("pmtiles-edge Archive Check");
    println!("═════════════════════════════════");
    println!();

    if let Err(e) = config.validate_origin() {
        println!("✗ Configuration: {}", e);
        return ExitCode::FAILURE;
    }

    match config.origin() {
        Some(Origin::Http { url }) => {
            println!("✓ Origin: {}", url);
            match http_origin(&config, &url) {
                Ok(archives) => check_datasets(&archives).await,
                Err(code) => code,
            }
        }
        Some(Origin::S3 {
            bucket,
            endpoint,
            region,
        }) => {
            println!("✓ Bucket: {}", bucket);
            if let Some(ref endpoint) = endpoint {
                println!("✓ Endpoint: {}", endpoint);
            }
            println!("✓ Region: {}", region);
            let client = create_s3_client(endpoint.as_deref(), &region).await;
            let archives = S3ArchiveSource::new(client, bucket, config.archive_prefix.clone());
            check_datasets(&archives).await
        }
        None => ExitCode::FAILURE,
    }
}

/// Open every dataset archive and print its header summary.
async fn check_datasets<A: ArchiveSource>(archives: &A) -> ExitCode {
    let mut failures = 0;

    for dataset in DatasetId::ALL {
        println!();
        print!("Checking '{}' ({})... ", dataset, dataset.config().archive);

        let summary = match check_dataset(archives, dataset).await {
            Ok(summary) => summary,
            Err(e) => {
                println!("✗ failed");
                println!("  Error: {}", e);
                failures += 1;
                continue;
            }
        };

        println!("✓ ok");
        let header = &summary.header;
        println!("  Spec version: {}", header.spec_version);
        println!("  Tile type: {}", header.tile_type.name());
        println!(
            "  Compression: tiles {}, directories {}",
            header.tile_compression.name(),
            header.internal_compression.name()
        );
        println!("  Zoom: {}-{}", header.min_zoom, header.max_zoom);
        println!(
            "  Bounds: [{:.4}, {:.4}, {:.4}, {:.4}]",
            header.bounds[0], header.bounds[1], header.bounds[2], header.bounds[3]
        );
        println!(
            "  Tiles: {} addressed, {} entries, {} contents",
            header.addressed_tiles_count, header.tile_entries_count, header.tile_contents_count
        );
        if let Some(ref etag) = summary.etag {
            println!("  ETag: {}", etag);
        }
        if let Some(ref name) = summary.name {
            println!("  Name: {}", name);
        }
    }

    println!();
    println!("═════════════════════════════════");
    if failures == 0 {
        println!("✓ All checks passed!");
        ExitCode::SUCCESS
    } else {
        println!("✗ {} check(s) failed", failures);
        ExitCode::FAILURE
    }
}
