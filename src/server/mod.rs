//! HTTP server layer.
//!
//! This module provides the HTTP API for serving vector tiles out of PMTiles
//! archives.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │     GET /{dataset}.json  /{dataset}/{z}/{x}/{y}.mvt  .pmtiles   │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌────────────┐  ┌─────────┐  │
//! │  │  handlers   │  │   access    │  │  response  │  │ routes  │  │
//! │  │ (requests)  │  │ (API keys)  │  │ (headers)  │  │ (router)│  │
//! │  └─────────────┘  └─────────────┘  └────────────┘  └─────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod access;
pub mod handlers;
pub mod response;
pub mod routes;

pub use access::{access_middleware, AccessGate, AuthError, API_KEY_PARAM, UNAUTHORIZED_MESSAGE};
pub use handlers::{
    endpoint_not_found, file_handler, health_handler, not_found_handler, public_origin,
    tile_handler, AppState, ErrorResponse, HealthResponse, KeyQueryParams, NotFoundResponse,
    TilePathParams, ENDPOINTS,
};
pub use response::{
    cors_middleware, negotiate_encoding, TileEncoding, METADATA_CACHE_CONTROL,
    TILE_CACHE_CONTROL,
};
pub use routes::{create_dev_router, create_router, RouterConfig};
