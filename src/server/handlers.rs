//! HTTP request handlers for the tile API.
//!
//! # Endpoints
//!
//! - `GET /{dataset}.json` - TileJSON document
//! - `GET /{dataset}/{z}/{x}/{y}.mvt` - Serve a tile
//! - `GET /{dataset}.pmtiles` - Raw archive bytes, `Range` honored
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::response::{
    metadata_response, negotiate_encoding, passthrough_response, tile_not_found, tile_response,
    TileEncoding,
};
use crate::archive::{ArchiveReader, Compression, DirectoryCache, TileCoord};
use crate::dataset::{DatasetId, TileJson};
use crate::error::{ArchiveError, IoError, TileError};
use crate::io::{ArchiveSource, RangeSource};

/// Endpoint shapes listed in 404 bodies.
pub const ENDPOINTS: [&str; 3] = [
    "/{dataset}.json",
    "/{dataset}/{z}/{x}/{y}.mvt",
    "/{dataset}.pmtiles",
];

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<A: ArchiveSource> {
    /// Origin holding the dataset archives
    pub archives: Arc<A>,

    /// Strategy for sharing parsed headers and directories between requests
    pub cache: DirectoryCache,

    /// Origin written into TileJSON tile URLs; derived from the request when
    /// unset
    pub public_url: Option<Arc<str>>,
}

impl<A: ArchiveSource> AppState<A> {
    /// Create a new application state with caching disabled.
    pub fn new(archives: A) -> Self {
        Self {
            archives: Arc::new(archives),
            cache: DirectoryCache::Disabled,
            public_url: None,
        }
    }

    pub fn with_cache(mut self, cache: DirectoryCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_public_url(mut self, url: impl AsRef<str>) -> Self {
        self.public_url = Some(Arc::from(url.as_ref().trim_end_matches('/')));
        self
    }
}

impl<A: ArchiveSource> Clone for AppState<A> {
    fn clone(&self) -> Self {
        Self {
            archives: Arc::clone(&self.archives),
            cache: self.cache.clone(),
            public_url: self.public_url.clone(),
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters shared by all endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct KeyQueryParams {
    /// API key (checked by the access middleware)
    #[serde(default)]
    pub key: Option<String>,
}

/// Path parameters for tile requests.
///
/// Extracted from: `/{dataset}/{z}/{x}/{filename}` where filename is `{y}.mvt`
/// (a bare `{y}` is accepted too).
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub dataset: String,
    pub z: String,
    pub x: String,
    pub filename: String,
}

impl TilePathParams {
    /// Parse `(z, x, y)`; `None` if any part is not an unsigned integer.
    pub fn coordinates(&self) -> Option<(u64, u64, u64)> {
        let y = self
            .filename
            .strip_suffix(".mvt")
            .unwrap_or(&self.filename);
        Some((
            self.z.parse().ok()?,
            self.x.parse().ok()?,
            y.parse().ok()?,
        ))
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Short error message
    pub error: String,

    /// Additional detail, when there is any worth exposing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// 404 body for unknown datasets and unmatched paths.
#[derive(Debug, Serialize)]
pub struct NotFoundResponse {
    pub error: String,
    pub endpoints: Vec<&'static str>,
    pub datasets: Vec<&'static str>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// Build the 404 JSON response listing endpoints and datasets.
pub fn endpoint_not_found(message: impl Into<String>) -> Response {
    let body = NotFoundResponse {
        error: message.into(),
        endpoints: ENDPOINTS.to_vec(),
        datasets: DatasetId::names(),
    };
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert TileError to HTTP response.
///
/// Logged by severity:
/// - 5xx at ERROR
/// - 400 at WARN
/// - 404 at DEBUG (common and expected)
impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            TileError::UnknownDataset(name) => {
                debug!(dataset = %name, status = 404, "Unknown dataset");
                return endpoint_not_found(format!("Unknown dataset: {}", name));
            }

            TileError::TileNotFound { dataset, z, x, y } => {
                debug!(dataset = %dataset, z, x, y, status = 404, "Tile not found");
                return tile_not_found();
            }

            TileError::Archive(
                err @ (ArchiveError::UnsupportedZoom { .. }
                | ArchiveError::InvalidCoordinate { .. }),
            ) => (
                StatusCode::BAD_REQUEST,
                "Invalid tile coordinate",
                err.to_string(),
            ),

            TileError::Archive(
                err @ (ArchiveError::InvalidArchive { .. } | ArchiveError::CorruptDirectory { .. }),
            ) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Invalid archive",
                err.to_string(),
            ),

            TileError::Archive(ArchiveError::Io(io_err)) | TileError::Origin(io_err) => (
                StatusCode::BAD_GATEWAY,
                "Origin error",
                origin_details(io_err),
            ),
        };

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        (status, Json(ErrorResponse::with_details(error_type, message))).into_response()
    }
}

fn origin_details(err: &IoError) -> String {
    match err {
        IoError::NotFound(identifier) => format!("Archive missing at origin: {}", identifier),
        other => other.to_string(),
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle single-segment requests: `/{dataset}.json` and `/{dataset}.pmtiles`.
///
/// Axum cannot capture part of a segment, so the suffix is dispatched here.
pub async fn file_handler<A>(
    State(state): State<AppState<A>>,
    Path(file): Path<String>,
    Query(query): Query<KeyQueryParams>,
    headers: HeaderMap,
) -> Result<Response, TileError>
where
    A: ArchiveSource + 'static,
{
    if let Some(name) = file.strip_suffix(".json") {
        let dataset: DatasetId = name.parse()?;
        return Ok(metadata(&state, dataset, query.key.as_deref(), &headers));
    }

    if let Some(name) = file.strip_suffix(".pmtiles") {
        let dataset: DatasetId = name.parse()?;
        return passthrough(&state, dataset, &headers).await;
    }

    Ok(endpoint_not_found(format!("No route for /{}", file)))
}

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /{dataset}/{z}/{x}/{y}.mvt`
///
/// # Response
///
/// - `200 OK`: tile bytes, `Content-Type` by archive tile type,
///   `Content-Encoding` when the stored compression is passed through
/// - `400 Bad Request`: zoom beyond 31, or x/y outside the zoom level
/// - `404 Not Found`: `Tile not found` (text), or JSON for unknown datasets
/// - `500 Internal Server Error`: malformed archive
/// - `502 Bad Gateway`: origin failure
///
/// # Headers
///
/// - `Cache-Control: public, max-age=2592000`
pub async fn tile_handler<A>(
    State(state): State<AppState<A>>,
    Path(params): Path<TilePathParams>,
    headers: HeaderMap,
) -> Result<Response, TileError>
where
    A: ArchiveSource + 'static,
{
    let dataset: DatasetId = params.dataset.parse()?;

    let Some((z, x, y)) = params.coordinates() else {
        return Ok(endpoint_not_found(format!(
            "No route for /{}/{}/{}/{}",
            params.dataset, params.z, params.x, params.filename
        )));
    };

    // Reject impossible coordinates before touching the origin
    let coord = TileCoord::new(z, x, y).map_err(TileError::Archive)?;

    let source = state.archives.open(dataset.config().archive)?;
    let reader = ArchiveReader::open(source, state.cache.clone()).await?;

    let tile = reader
        .get_tile(coord.z.into(), x, y)
        .await?
        .ok_or_else(|| TileError::TileNotFound {
            dataset: dataset.to_string(),
            z: coord.z,
            x: coord.x,
            y: coord.y,
        })?;

    let vary = tile.compression == Compression::Brotli;
    let response = match negotiate_encoding(tile.compression, &headers) {
        TileEncoding::Identity => tile_response(tile.data, tile.tile_type, None, false),
        TileEncoding::Passthrough(encoding) => {
            tile_response(tile.data, tile.tile_type, Some(encoding), vary)
        }
        TileEncoding::Decode => {
            let decoded = reader.decode_tile(&tile)?;
            tile_response(decoded, tile.tile_type, None, vary)
        }
    };

    Ok(response)
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Fallback for every path no route matched.
pub async fn not_found_handler(uri: Uri) -> Response {
    debug!(path = uri.path(), "No route matched");
    endpoint_not_found(format!("No route for {}", uri.path()))
}

/// Build the TileJSON response for `dataset`. No archive I/O.
fn metadata<A: ArchiveSource>(
    state: &AppState<A>,
    dataset: DatasetId,
    api_key: Option<&str>,
    headers: &HeaderMap,
) -> Response {
    let origin = public_origin(state.public_url.as_deref(), headers);
    metadata_response(TileJson::for_dataset(dataset, &origin, api_key))
}

/// Forward the raw archive, passing an inbound `Range` header through.
async fn passthrough<A>(
    state: &AppState<A>,
    dataset: DatasetId,
    headers: &HeaderMap,
) -> Result<Response, TileError>
where
    A: ArchiveSource + 'static,
{
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let source = state.archives.open(dataset.config().archive)?;
    debug!(
        archive = source.identifier(),
        range = ?range,
        "Passing archive through"
    );
    let raw = source.open_raw(range).await?;
    Ok(passthrough_response(raw))
}

/// Public origin of this service as seen by the client.
///
/// Uses the configured URL when there is one, otherwise
/// `{X-Forwarded-Proto or http}://{Host}`.
pub fn public_origin(configured: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(url) = configured {
        return url.trim_end_matches('/').to_string();
    }

    // Detect protocol from X-Forwarded-Proto header (for reverse proxy support)
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http");

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    format!("{}://{}", proto, host)
}
