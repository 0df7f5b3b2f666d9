//! Archive reader: header, directories and tile lookup over a [`RangeSource`].
//!
//! # Read chain
//!
//! ```text
//! open()      bytes 0..16384 ──► header + root directory (one round trip)
//!                                     │
//! find_tile() root.find(id) ──► leaf? ─┴─► leaf_dirs_offset + entry.offset
//!                                     │         (up to depth 3)
//!                                     ▼
//! get_tile()  tile_data_offset + entry.offset, entry.length bytes
//! ```
//!
//! Reads after the first carry the archive's ETag as `If-Match`. If the
//! object changed underneath us the origin answers 412; the reader then drops
//! cached state for the archive, reloads the head and retries the lookup once.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use super::cache::DirectoryCache;
use super::compression::decompress;
use super::directory::{Directory, DirectoryEntry};
use super::header::{Compression, Header, TileType, INITIAL_FETCH_SIZE};
use super::tile_id::TileCoord;
use crate::error::{ArchiveError, IoError};
use crate::io::{CacheMetadata, RangeSource};

/// Root directory plus up to two levels of leaves.
pub const MAX_DIRECTORY_DEPTH: usize = 3;

/// Parsed header and root directory of one archive, with the cache metadata
/// of the read that produced them.
#[derive(Debug, Clone)]
pub struct ArchiveHead {
    pub header: Header,
    pub root: Directory,
    pub cache: CacheMetadata,
}

impl ArchiveHead {
    /// ETag usable for `If-Match`. Weak validators never match strongly, so
    /// they are not sent.
    fn if_match(&self) -> Option<&str> {
        self.cache
            .etag
            .as_deref()
            .filter(|etag| !etag.starts_with("W/"))
    }
}

/// Absolute position of a tile's bytes within the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLocation {
    pub tile_id: u64,
    pub offset: u64,
    pub length: u32,
}

/// Tile bytes as stored in the archive.
#[derive(Debug, Clone)]
pub struct TileData {
    /// Still encoded with `compression`
    pub data: Bytes,
    pub compression: Compression,
    pub tile_type: TileType,
}

/// Reader for a single PMTiles v3 archive.
///
/// Cheap to create per request: with [`DirectoryCache::Disabled`] opening
/// costs one origin read, with [`DirectoryCache::Memory`] usually none.
pub struct ArchiveReader<R> {
    source: R,
    cache: DirectoryCache,
    head: Arc<ArchiveHead>,
}

impl<R: RangeSource> ArchiveReader<R> {
    /// Open an archive, reading its header and root directory.
    ///
    /// # Errors
    /// - `Io` if the origin read fails
    /// - `InvalidArchive` if the header is malformed
    /// - `CorruptDirectory` if the root directory cannot be decoded
    pub async fn open(source: R, cache: DirectoryCache) -> Result<Self, ArchiveError> {
        let head = cache
            .head(source.identifier(), || load_head(&source))
            .await?;
        Ok(Self {
            source,
            cache,
            head,
        })
    }

    pub fn header(&self) -> &Header {
        &self.head.header
    }

    pub fn root(&self) -> &Directory {
        &self.head.root
    }

    /// ETag of the archive as seen when it was opened.
    pub fn etag(&self) -> Option<&str> {
        self.head.cache.etag.as_deref()
    }

    pub fn identifier(&self) -> &str {
        self.source.identifier()
    }

    /// Read and parse the archive's embedded JSON metadata.
    ///
    /// An archive without metadata yields an empty object.
    pub async fn metadata(&self) -> Result<serde_json::Value, ArchiveError> {
        let header = &self.head.header;
        if header.metadata_length == 0 {
            return Ok(serde_json::Value::Object(Default::default()));
        }

        let raw = read_exact(
            &self.source,
            header.metadata_offset,
            header.metadata_length,
            self.head.if_match(),
            "metadata",
        )
        .await?;
        let json = decompress(header.internal_compression, raw)?;

        serde_json::from_slice(&json)
            .map_err(|e| ArchiveError::invalid(format!("metadata is not valid JSON: {}", e)))
    }

    /// Locate the bytes of tile `(z, x, y)`.
    ///
    /// `Ok(None)` means the archive has no tile at that coordinate.
    ///
    /// # Errors
    /// - `UnsupportedZoom` / `InvalidCoordinate` for out-of-range input
    /// - `CorruptDirectory` for undecodable or over-deep directories
    /// - `Io` if an origin read fails
    pub async fn find_tile(
        &self,
        z: u32,
        x: u64,
        y: u64,
    ) -> Result<Option<TileLocation>, ArchiveError> {
        let coord = TileCoord::new(z.into(), x, y)?;
        match self.locate(&self.head, coord.tile_id()).await {
            Err(ArchiveError::Io(IoError::PreconditionFailed(_))) => {
                let head = self.reload().await?;
                self.locate(&head, coord.tile_id()).await
            }
            other => other,
        }
    }

    /// Fetch the stored bytes of tile `(z, x, y)`.
    ///
    /// The bytes are returned still encoded; see [`Self::decode_tile`].
    pub async fn get_tile(
        &self,
        z: u32,
        x: u64,
        y: u64,
    ) -> Result<Option<TileData>, ArchiveError> {
        let coord = TileCoord::new(z.into(), x, y)?;
        match self.fetch_tile(&self.head, coord).await {
            Err(ArchiveError::Io(IoError::PreconditionFailed(_))) => {
                let head = self.reload().await?;
                self.fetch_tile(&head, coord).await
            }
            other => other,
        }
    }

    /// Remove the tile compression from `tile`.
    pub fn decode_tile(&self, tile: &TileData) -> Result<Bytes, ArchiveError> {
        decompress(tile.compression, tile.data.clone())
    }

    async fn fetch_tile(
        &self,
        head: &ArchiveHead,
        coord: TileCoord,
    ) -> Result<Option<TileData>, ArchiveError> {
        let location = match self.locate(head, coord.tile_id()).await? {
            Some(location) => location,
            None => {
                debug!(
                    archive = self.identifier(),
                    z = coord.z,
                    x = coord.x,
                    y = coord.y,
                    "No directory entry for tile"
                );
                return Ok(None);
            }
        };

        let data = read_exact(
            &self.source,
            location.offset,
            location.length as u64,
            head.if_match(),
            "tile",
        )
        .await?;

        Ok(Some(TileData {
            data,
            compression: head.header.tile_compression,
            tile_type: head.header.tile_type,
        }))
    }

    /// Walk the directory tree for `tile_id`.
    async fn locate(
        &self,
        head: &ArchiveHead,
        tile_id: u64,
    ) -> Result<Option<TileLocation>, ArchiveError> {
        let header = &head.header;
        let mut entry: DirectoryEntry = match head.root.find(tile_id) {
            Some(entry) => *entry,
            None => return Ok(None),
        };

        let mut depth = 1;
        while entry.is_leaf() {
            if depth >= MAX_DIRECTORY_DEPTH {
                return Err(ArchiveError::corrupt(format!(
                    "directory nesting exceeds {} levels",
                    MAX_DIRECTORY_DEPTH
                )));
            }
            let offset = section_offset(
                entry,
                header.leaf_dirs_offset,
                header.leaf_dirs_length,
                "leaf directory",
            )?;
            let length = entry.length as u64;
            let leaf = self
                .cache
                .leaf(self.identifier(), offset, length, || {
                    load_directory(&self.source, header, offset, length, head.if_match())
                })
                .await?;

            entry = match leaf.find(tile_id) {
                Some(entry) => *entry,
                None => return Ok(None),
            };
            depth += 1;
        }

        let offset = section_offset(
            entry,
            header.tile_data_offset,
            header.tile_data_length,
            "tile",
        )?;
        Ok(Some(TileLocation {
            tile_id,
            offset,
            length: entry.length,
        }))
    }

    /// Drop cached state and read the head again.
    async fn reload(&self) -> Result<Arc<ArchiveHead>, ArchiveError> {
        warn!(
            archive = self.identifier(),
            etag = ?self.etag(),
            "Archive changed during read, reloading header"
        );
        self.cache.invalidate(self.identifier()).await;
        self.cache
            .head(self.identifier(), || load_head(&self.source))
            .await
    }
}

/// Absolute archive offset of `entry` within the section at `start` of
/// `length` bytes, failing if the entry points outside it.
fn section_offset(
    entry: DirectoryEntry,
    start: u64,
    length: u64,
    what: &str,
) -> Result<u64, ArchiveError> {
    let absolute = entry
        .offset
        .checked_add(entry.length as u64)
        .filter(|end| *end <= length)
        .and_then(|_| start.checked_add(entry.offset));
    absolute.ok_or_else(|| {
        ArchiveError::corrupt(format!(
            "{} entry for id {} at {}+{} exceeds section {}+{}",
            what, entry.tile_id, entry.offset, entry.length, start, length
        ))
    })
}

/// Read the header and root directory of an archive.
async fn load_head<R: RangeSource>(source: &R) -> Result<ArchiveHead, ArchiveError> {
    let initial = source.get_bytes(0, INITIAL_FETCH_SIZE, None).await?;
    let header = Header::parse(&initial.data)?;

    let root_bytes = if header.root_within(initial.data.len()) {
        let start = header.root_dir_offset as usize;
        initial
            .data
            .slice(start..start + header.root_dir_length as usize)
    } else {
        debug!(
            archive = source.identifier(),
            offset = header.root_dir_offset,
            length = header.root_dir_length,
            "Root directory outside initial fetch"
        );
        read_exact(
            source,
            header.root_dir_offset,
            header.root_dir_length,
            initial.cache.etag.as_deref().filter(|e| !e.starts_with("W/")),
            "root directory",
        )
        .await?
    };

    let root = Directory::decode(&decompress(header.internal_compression, root_bytes)?)?;
    debug!(
        archive = source.identifier(),
        entries = root.len(),
        tile_type = header.tile_type.name(),
        "Opened archive"
    );

    Ok(ArchiveHead {
        header,
        root,
        cache: initial.cache,
    })
}

async fn load_directory<R: RangeSource>(
    source: &R,
    header: &Header,
    offset: u64,
    length: u64,
    if_match: Option<&str>,
) -> Result<Directory, ArchiveError> {
    let raw = read_exact(source, offset, length, if_match, "leaf directory").await?;
    Directory::decode(&decompress(header.internal_compression, raw)?)
}

/// Read exactly `length` bytes or fail with `CorruptDirectory`.
async fn read_exact<R: RangeSource>(
    source: &R,
    offset: u64,
    length: u64,
    if_match: Option<&str>,
    what: &str,
) -> Result<Bytes, ArchiveError> {
    let len = usize::try_from(length)
        .map_err(|_| ArchiveError::corrupt(format!("{} length {} too large", what, length)))?;
    let response = source.get_bytes(offset, len, if_match).await?;
    if response.data.len() < len {
        return Err(ArchiveError::corrupt(format!(
            "{} truncated: expected {} bytes at {}, got {}",
            what,
            len,
            offset,
            response.data.len()
        )));
    }
    Ok(response.data)
}
