use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;

use crate::error::IoError;

/// Upstream cache metadata carried along with every origin read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetadata {
    /// Entity tag of the archive object
    pub etag: Option<String>,

    /// Raw `Expires` header value
    pub expires: Option<String>,

    /// Raw `Cache-Control` header value
    pub cache_control: Option<String>,
}

/// Bytes returned for a requested window.
///
/// `data` may be shorter than requested when the window runs past the end of
/// the object.
#[derive(Debug, Clone)]
pub struct RangeResponse {
    pub data: Bytes,
    pub cache: CacheMetadata,
}

/// An unmodified origin response, used for full-archive passthrough.
pub struct RawResponse {
    /// Upstream status (200, 206, 304 or 416)
    pub status: u16,

    pub cache: CacheMetadata,

    pub content_type: Option<String>,

    pub content_length: Option<u64>,

    pub content_range: Option<String>,

    pub last_modified: Option<String>,

    pub body: Body,
}

impl std::fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("cache", &self.cache)
            .field("content_length", &self.content_length)
            .field("content_range", &self.content_range)
            .finish_non_exhaustive()
    }
}

/// Trait for reading byte ranges from one remote archive object.
///
/// The archive reader and the passthrough endpoint work against this
/// abstraction so they never download whole files. Implementations must be
/// thread-safe; any number of reads may run concurrently.
#[async_trait]
pub trait RangeSource: Send + Sync {
    /// Read `len` bytes starting at `offset`.
    ///
    /// When `if_match` is given the read is conditional on the object still
    /// carrying that entity tag; a mismatch yields
    /// [`IoError::PreconditionFailed`].
    async fn get_bytes(
        &self,
        offset: u64,
        len: usize,
        if_match: Option<&str>,
    ) -> Result<RangeResponse, IoError>;

    /// Forward a whole-object request, passing an inbound `Range` header
    /// through unchanged.
    async fn open_raw(&self, range: Option<&str>) -> Result<RawResponse, IoError>;

    /// Get a unique identifier for this object (for logging and cache keys).
    fn identifier(&self) -> &str;
}

/// Trait for creating range sources from archive paths.
///
/// This lets the router work with different origins (plain HTTP buckets, S3)
/// without being tied to one of them.
pub trait ArchiveSource: Send + Sync {
    /// The type of range source this origin creates.
    type Source: RangeSource + 'static;

    /// Create a range source for the archive at `path` (e.g. `clu.pmtiles`).
    ///
    /// This performs no I/O; errors only arise from malformed paths.
    fn open(&self, path: &str) -> Result<Self::Source, IoError>;
}

/// Build a `Range` header value for an inclusive byte window.
///
/// Callers skip zero-length reads. The end saturates at `u64::MAX`.
pub fn range_header(offset: u64, len: usize) -> String {
    let last = offset.saturating_add((len as u64).saturating_sub(1));
    format!("bytes={}-{}", offset, last)
}

/// Cut the requested window out of a full-object body.
///
/// Used when an origin ignores the `Range` header and answers 200.
pub fn slice_window(full: Bytes, offset: u64, len: usize) -> Bytes {
    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(full.len());
    let end = start.saturating_add(len).min(full.len());
    full.slice(start..end)
}

// =============================================================================
// Little-Endian Helpers
// =============================================================================
//
// Every multi-byte integer in a PMTiles header is little-endian.

/// Read a little-endian u64 from a byte slice.
///
/// # Panics
/// Panics if the slice has fewer than 8 bytes.
#[inline]
pub fn read_u64_le(bytes: &[u8]) -> u64 {
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

/// Read a little-endian i32 from a byte slice.
///
/// # Panics
/// Panics if the slice has fewer than 4 bytes.
#[inline]
pub fn read_i32_le(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
