//! Response assembly: CORS, cache-control, content type and encoding.
//!
//! # Header Policy
//!
//! ```text
//! every response   Access-Control-Allow-Origin: *  (+ methods, headers, expose)
//! OPTIONS *        204, CORS headers only
//! metadata         Cache-Control: public, max-age=86400
//! tile hit / miss  Cache-Control: public, max-age=2592000
//! passthrough      upstream Cache-Control, ETag, Content-Range, ...
//! ```
//!
//! Tiles are never re-encoded. Gzip tiles always go out with
//! `Content-Encoding: gzip`; brotli tiles keep their encoding only when the
//! client lists `br` in `Accept-Encoding` and are decoded otherwise.

use axum::{
    body::Body,
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use http::header::{
    ACCEPT_ENCODING, ACCEPT_RANGES, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE,
    CACHE_CONTROL, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, EXPIRES,
    LAST_MODIFIED, VARY,
};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use tracing::debug;

use crate::archive::{Compression, TileType};
use crate::dataset::TileJson;
use crate::io::RawResponse;

pub const METADATA_CACHE_CONTROL: &str = "public, max-age=86400";
pub const TILE_CACHE_CONTROL: &str = "public, max-age=2592000";

const CORS_ALLOW_METHODS: &str = "GET, HEAD, OPTIONS";
const CORS_ALLOW_HEADERS: &str = "Content-Type, Range";
const CORS_EXPOSE_HEADERS: &str = "ETag, Content-Range, Content-Length, Accept-Ranges";
const CORS_MAX_AGE: &str = "86400";

const TILE_NOT_FOUND_BODY: &str = "Tile not found";

// =============================================================================
// CORS
// =============================================================================

/// Add the CORS headers to a header map.
pub fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    headers.insert(
        ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(CORS_EXPOSE_HEADERS),
    );
}

/// Answer preflights with 204 and stamp CORS headers on everything else,
/// including error responses produced further in.
pub async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors(response.headers_mut());
        response
            .headers_mut()
            .insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(CORS_MAX_AGE));
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors(response.headers_mut());
    response
}

// =============================================================================
// Encoding Negotiation
// =============================================================================

/// How stored tile bytes go out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileEncoding {
    /// Stored uncompressed; sent as is
    Identity,
    /// Sent still compressed with this `Content-Encoding`
    Passthrough(&'static str),
    /// Decompressed before sending
    Decode,
}

/// Decide how to send a tile stored with `compression`.
pub fn negotiate_encoding(compression: Compression, request_headers: &HeaderMap) -> TileEncoding {
    match compression {
        Compression::None | Compression::Unknown => TileEncoding::Identity,
        Compression::Gzip => TileEncoding::Passthrough("gzip"),
        Compression::Brotli if accepts_encoding(request_headers, "br") => {
            TileEncoding::Passthrough("br")
        }
        Compression::Brotli | Compression::Zstd => TileEncoding::Decode,
    }
}

/// Whether `Accept-Encoding` lists `coding` with a non-zero quality.
pub fn accepts_encoding(headers: &HeaderMap, coding: &str) -> bool {
    headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|item| {
            let mut parts = item.split(';').map(str::trim);
            let name = parts.next().unwrap_or("");
            if !name.eq_ignore_ascii_case(coding) {
                return false;
            }
            // q=0 means "not acceptable"
            !parts.any(|p| {
                p.strip_prefix("q=")
                    .and_then(|q| q.parse::<f32>().ok())
                    .map(|q| q == 0.0)
                    .unwrap_or(false)
            })
        })
}

// =============================================================================
// Builders
// =============================================================================

/// 200 response carrying tile bytes.
pub fn tile_response(
    data: Bytes,
    tile_type: TileType,
    content_encoding: Option<&'static str>,
    vary_encoding: bool,
) -> Response {
    let mut response = Response::new(Body::from(data));
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(tile_type.content_type()),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(TILE_CACHE_CONTROL));
    if let Some(encoding) = content_encoding {
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static(encoding));
    }
    if vary_encoding {
        headers.insert(VARY, HeaderValue::from_static("Accept-Encoding"));
    }
    response
}

/// 404 response for a coordinate with no tile.
///
/// Cached as long as a hit: the archive is immutable, so the miss is too.
pub fn tile_not_found() -> Response {
    let mut response = (StatusCode::NOT_FOUND, TILE_NOT_FOUND_BODY).into_response();
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static(TILE_CACHE_CONTROL));
    response
}

/// 200 response carrying a TileJSON document.
pub fn metadata_response(document: TileJson) -> Response {
    let mut response = Json(document).into_response();
    response.headers_mut().insert(
        CACHE_CONTROL,
        HeaderValue::from_static(METADATA_CACHE_CONTROL),
    );
    response
}

/// Forward an upstream archive response unchanged.
pub fn passthrough_response(raw: RawResponse) -> Response {
    let status = StatusCode::from_u16(raw.status).unwrap_or(StatusCode::BAD_GATEWAY);
    debug!(status = raw.status, range = ?raw.content_range, "Forwarding archive bytes");

    let mut response = Response::new(raw.body);
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );

    let forwarded: [(HeaderName, Option<String>); 7] = [
        (CONTENT_TYPE, raw.content_type),
        (CONTENT_LENGTH, raw.content_length.map(|n| n.to_string())),
        (CONTENT_RANGE, raw.content_range),
        (ETAG, raw.cache.etag),
        (LAST_MODIFIED, raw.last_modified),
        (CACHE_CONTROL, raw.cache.cache_control),
        (EXPIRES, raw.cache.expires),
    ];
    for (name, value) in forwarded {
        if let Some(value) = value.and_then(|v| HeaderValue::from_str(&v).ok()) {
            headers.insert(name, value);
        }
    }

    response
}
