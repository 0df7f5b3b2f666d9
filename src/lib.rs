//! # pmtiles-edge
//!
//! An edge tile server for PMTiles archives stored in object storage.
//!
//! This library serves vector tiles by reading PMTiles v3 archives in place
//! with HTTP range requests. Nothing is downloaded up front: each tile costs a
//! header read, a directory lookup and one ranged read of the tile bytes.
//!
//! ## Features
//!
//! - **Range-based streaming**: Reads only the bytes needed for each tile
//! - **Two origins**: Plain HTTP(S) base URLs and S3-compatible buckets
//! - **TileJSON 3.0.0**: Metadata documents pointing back at this service
//! - **Raw passthrough**: Whole archives forwarded with `Range` support
//! - **API keys**: Constant-time allow-list check on every request
//! - **Optional directory cache**: In-memory LRU of headers and leaf directories
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`io`] - Range reads against HTTP and S3 origins
//! - [`archive`] - PMTiles header, directories and tile lookup
//! - [`dataset`] - Static dataset catalog and TileJSON builder
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use pmtiles_edge::{create_router, HttpArchiveSource, RouterConfig, DEFAULT_ORIGIN_TIMEOUT};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let archives = HttpArchiveSource::new(
//!         "https://tiles.example.com/archives",
//!         None,
//!         DEFAULT_ORIGIN_TIMEOUT,
//!         true,
//!     )?;
//!     let router = create_router(archives, RouterConfig::new(vec!["dev".to_string()]));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod config;
pub mod dataset;
pub mod error;
pub mod io;
pub mod server;

// Re-export commonly used types
pub use archive::{
    tile_id_to_zxy, zxy_to_tile_id, ArchiveReader, Compression, Directory, DirectoryCache,
    DirectoryEntry, Header, TileCoord, TileData, TileType,
};
pub use config::{Cli, Command, Config, Origin};
pub use dataset::{DatasetConfig, DatasetId, TileJson};
pub use error::{ArchiveError, IoError, TileError};
pub use io::{
    create_s3_client, ArchiveSource, HttpArchiveSource, RangeSource, S3ArchiveSource,
    DEFAULT_ORIGIN_TIMEOUT,
};
pub use server::{
    create_dev_router, create_router, AccessGate, AppState, AuthError, ErrorResponse,
    RouterConfig,
};
