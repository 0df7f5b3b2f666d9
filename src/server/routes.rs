//! Router configuration for the tile server.
//!
//! This module defines the HTTP routes and applies middleware for access
//! control and CORS.
//!
//! # Route Structure
//!
//! ```text
//! /health                          - Health check
//! /{dataset}.json                  - TileJSON metadata
//! /{dataset}/{z}/{x}/{y}.mvt       - Tile endpoint
//! /{dataset}.pmtiles               - Raw archive passthrough
//! *                                - 404 with endpoint listing
//! ```
//!
//! # Layers
//!
//! ```text
//! TraceLayer -> cors_middleware -> access_middleware -> routes
//! ```
//!
//! Every route, the fallback included, sits behind the access gate. `OPTIONS`
//! is answered by the CORS layer before the gate is consulted.
//!
//! # Example
//!
//! ```ignore
//! use pmtiles_edge::io::HttpArchiveSource;
//! use pmtiles_edge::server::{create_router, RouterConfig};
//!
//! let archives = HttpArchiveSource::new("https://bucket.example.com", None, timeout, 1)?;
//! let config = RouterConfig::new(vec!["dev".to_string()]);
//!
//! let router = create_router(archives, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! ```

use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use super::access::{access_middleware, AccessGate};
use super::handlers::{file_handler, health_handler, not_found_handler, tile_handler, AppState};
use super::response::cors_middleware;
use crate::archive::DirectoryCache;
use crate::io::ArchiveSource;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Clone)]
pub struct RouterConfig {
    /// API key allow-list check
    pub gate: AccessGate,

    /// Origin written into TileJSON tile URLs (None = derive from request)
    pub public_url: Option<String>,

    /// Directory cache strategy
    pub cache: DirectoryCache,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Create a new router configuration accepting the given API keys.
    ///
    /// By default:
    /// - The access gate is enabled
    /// - Directory caching is disabled
    /// - Tracing is enabled
    pub fn new(api_keys: Vec<String>) -> Self {
        Self {
            gate: AccessGate::new(api_keys),
            public_url: None,
            cache: DirectoryCache::Disabled,
            enable_tracing: true,
        }
    }

    /// Create a configuration with the access gate disabled.
    ///
    /// **Warning**: This should only be used for development/testing.
    pub fn without_auth() -> Self {
        Self {
            gate: AccessGate::disabled(),
            ..Self::new(Vec::new())
        }
    }

    /// Replace the access gate.
    pub fn with_gate(mut self, gate: AccessGate) -> Self {
        self.gate = gate;
        self
    }

    /// Set the public origin used in TileJSON tile URLs.
    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = Some(url.into());
        self
    }

    /// Set the directory cache strategy.
    pub fn with_directory_cache(mut self, cache: DirectoryCache) -> Self {
        self.cache = cache;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// # Arguments
///
/// * `archives` - Origin holding the dataset archives
/// * `config` - Router configuration
///
/// # Returns
///
/// A configured Axum router ready to be served.
pub fn create_router<A>(archives: A, config: RouterConfig) -> Router
where
    A: ArchiveSource + 'static,
{
    let mut app_state = AppState::new(archives).with_cache(config.cache);
    if let Some(url) = &config.public_url {
        app_state = app_state.with_public_url(url);
    }

    // {file} captures both "{dataset}.json" and "{dataset}.pmtiles";
    // {filename} captures both "{y}" and "{y}.mvt"
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/{file}", get(file_handler::<A>))
        .route(
            "/{dataset}/{z}/{x}/{filename}",
            get(tile_handler::<A>),
        )
        .fallback(not_found_handler)
        .with_state(app_state)
        .layer(middleware::from_fn_with_state(
            config.gate,
            access_middleware,
        ))
        .layer(middleware::from_fn(cors_middleware));

    // Add tracing if enabled
    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Create a development router with the access gate disabled.
///
/// **Warning**: This should only be used for local development and testing.
/// Never use this in production.
pub fn create_dev_router<A>(archives: A) -> Router
where
    A: ArchiveSource + 'static,
{
    create_router(archives, RouterConfig::without_auth())
}

// =============================================================================
// Tests
// =============================================================================
