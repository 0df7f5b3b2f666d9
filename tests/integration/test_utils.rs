//! Test utilities for integration tests.
//!
//! This module provides a PMTiles archive builder and mock origin
//! implementations with request tracking.

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pmtiles_edge::archive::{zxy_to_tile_id, Compression, DirectoryEntry, TileType, HEADER_SIZE};
use pmtiles_edge::error::IoError;
use pmtiles_edge::io::{
    slice_window, ArchiveSource, CacheMetadata, RangeResponse, RangeSource, RawResponse,
};

// =============================================================================
// Encoding Helpers
// =============================================================================

pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Serialize directory entries (uncompressed).
pub fn encode_directory(entries: &[DirectoryEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    write_varint(&mut out, entries.len() as u64);
    let mut last = 0;
    for e in entries {
        write_varint(&mut out, e.tile_id - last);
        last = e.tile_id;
    }
    for e in entries {
        write_varint(&mut out, e.run_length as u64);
    }
    for e in entries {
        write_varint(&mut out, e.length as u64);
    }
    for (i, e) in entries.iter().enumerate() {
        if i > 0 && e.offset == entries[i - 1].offset + entries[i - 1].length as u64 {
            write_varint(&mut out, 0);
        } else {
            write_varint(&mut out, e.offset + 1);
        }
    }
    out
}

pub fn compress(compression: Compression, data: &[u8]) -> Vec<u8> {
    match compression {
        Compression::Gzip => {
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        }
        Compression::Brotli => {
            let mut out = Vec::new();
            {
                let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 11, 22);
                writer.write_all(data).unwrap();
            }
            out
        }
        _ => data.to_vec(),
    }
}

pub fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut decoder = flate2::write::GzDecoder::new(&mut out);
    decoder.write_all(data).unwrap();
    decoder.finish().unwrap();
    out
}

fn compression_code(compression: Compression) -> u8 {
    match compression {
        Compression::Unknown => 0,
        Compression::None => 1,
        Compression::Gzip => 2,
        Compression::Brotli => 3,
        Compression::Zstd => 4,
    }
}

fn tile_type_code(tile_type: TileType) -> u8 {
    match tile_type {
        TileType::Unknown => 0,
        TileType::Mvt => 1,
        TileType::Png => 2,
        TileType::Jpeg => 3,
        TileType::Webp => 4,
        TileType::Avif => 5,
    }
}

// =============================================================================
// Archive Layout
// =============================================================================

/// Raw sections of an archive, already encoded.
///
/// Lets tests build archives with hand-crafted directories.
pub struct ArchiveLayout {
    pub root: Vec<u8>,
    pub metadata: Vec<u8>,
    pub leaf_dirs: Vec<u8>,
    pub tile_data: Vec<u8>,
    pub internal_compression: Compression,
    pub tile_compression: Compression,
    pub tile_type: TileType,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub tile_count: u64,
}

impl ArchiveLayout {
    /// Header, root, metadata, leaves and tile data, in that order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let root_offset = HEADER_SIZE as u64;
        let metadata_offset = root_offset + self.root.len() as u64;
        let leaf_offset = metadata_offset + self.metadata.len() as u64;
        let tile_offset = leaf_offset + self.leaf_dirs.len() as u64;

        let mut out = vec![0u8; HEADER_SIZE];
        out[0..7].copy_from_slice(b"PMTiles");
        out[7] = 3;
        let fields = [
            root_offset,
            self.root.len() as u64,
            metadata_offset,
            self.metadata.len() as u64,
            leaf_offset,
            self.leaf_dirs.len() as u64,
            tile_offset,
            self.tile_data.len() as u64,
            self.tile_count,
            self.tile_count,
            self.tile_count,
        ];
        for (i, value) in fields.iter().enumerate() {
            let at = 8 + i * 8;
            out[at..at + 8].copy_from_slice(&value.to_le_bytes());
        }
        out[96] = 1;
        out[97] = compression_code(self.internal_compression);
        out[98] = compression_code(self.tile_compression);
        out[99] = tile_type_code(self.tile_type);
        out[100] = self.min_zoom;
        out[101] = self.max_zoom;

        // Bounds: whole world, degrees x 1e7
        let bounds: [i32; 4] = [-1_800_000_000, -850_511_287, 1_800_000_000, 850_511_287];
        for (i, value) in bounds.iter().enumerate() {
            let at = 102 + i * 4;
            out[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }

        out.extend_from_slice(&self.root);
        out.extend_from_slice(&self.metadata);
        out.extend_from_slice(&self.leaf_dirs);
        out.extend_from_slice(&self.tile_data);
        out
    }
}

// =============================================================================
// Archive Builder
// =============================================================================

/// Builds PMTiles v3 archives in memory.
pub struct ArchiveBuilder {
    tiles: Vec<(u64, Vec<u8>, u32)>,
    tile_compression: Compression,
    internal_compression: Compression,
    tile_type: TileType,
    metadata: String,
    leaf_size: Option<usize>,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            tiles: Vec::new(),
            tile_compression: Compression::None,
            internal_compression: Compression::None,
            tile_type: TileType::Mvt,
            metadata: "{}".to_string(),
            leaf_size: None,
        }
    }

    /// Add a tile at `(z, x, y)` with uncompressed `content`.
    pub fn tile(self, z: u32, x: u64, y: u64, content: &[u8]) -> Self {
        let tile_id = zxy_to_tile_id(z, x, y).unwrap();
        self.run(tile_id, content, 1)
    }

    /// Add an entry covering `run_length` consecutive tile ids.
    pub fn run(mut self, tile_id: u64, content: &[u8], run_length: u32) -> Self {
        self.tiles.push((tile_id, content.to_vec(), run_length));
        self
    }

    pub fn tile_compression(mut self, compression: Compression) -> Self {
        self.tile_compression = compression;
        self
    }

    pub fn internal_compression(mut self, compression: Compression) -> Self {
        self.internal_compression = compression;
        self
    }

    pub fn tile_type(mut self, tile_type: TileType) -> Self {
        self.tile_type = tile_type;
        self
    }

    pub fn metadata(mut self, json: &str) -> Self {
        self.metadata = json.to_string();
        self
    }

    /// Split the entries into leaf directories of `entries` each.
    pub fn leaf_size(mut self, entries: usize) -> Self {
        self.leaf_size = Some(entries);
        self
    }

    pub fn layout(mut self) -> ArchiveLayout {
        self.tiles.sort_by_key(|(id, _, _)| *id);

        let mut entries = Vec::new();
        let mut tile_data = Vec::new();
        for (tile_id, content, run_length) in &self.tiles {
            let bytes = compress(self.tile_compression, content);
            entries.push(DirectoryEntry {
                tile_id: *tile_id,
                offset: tile_data.len() as u64,
                length: bytes.len() as u32,
                run_length: *run_length,
            });
            tile_data.extend_from_slice(&bytes);
        }

        let internal = self.internal_compression;
        let (root_entries, leaf_dirs) = match self.leaf_size {
            None => (entries, Vec::new()),
            Some(size) => {
                let mut root_entries = Vec::new();
                let mut leaf_dirs = Vec::new();
                for chunk in entries.chunks(size) {
                    let leaf = compress(internal, &encode_directory(chunk));
                    root_entries.push(DirectoryEntry {
                        tile_id: chunk[0].tile_id,
                        offset: leaf_dirs.len() as u64,
                        length: leaf.len() as u32,
                        run_length: 0,
                    });
                    leaf_dirs.extend_from_slice(&leaf);
                }
                (root_entries, leaf_dirs)
            }
        };

        let max_zoom = self
            .tiles
            .last()
            .map(|(id, _, _)| zoom_of(*id))
            .unwrap_or(0);

        ArchiveLayout {
            root: compress(internal, &encode_directory(&root_entries)),
            metadata: compress(internal, self.metadata.as_bytes()),
            leaf_dirs,
            tile_data,
            internal_compression: internal,
            tile_compression: self.tile_compression,
            tile_type: self.tile_type,
            min_zoom: 0,
            max_zoom,
            tile_count: self.tiles.len() as u64,
        }
    }

    pub fn build(self) -> Vec<u8> {
        self.layout().to_bytes()
    }
}

fn zoom_of(tile_id: u64) -> u8 {
    let mut z = 0u8;
    let mut first = 0u64;
    loop {
        let next = first + (1u64 << (2 * z as u64));
        if tile_id < next {
            return z;
        }
        first = next;
        z += 1;
    }
}

// =============================================================================
// Mock Origin with Request Tracking
// =============================================================================

#[derive(Clone)]
struct MockObject {
    data: Bytes,
    etag: String,
}

/// A mock origin serving archives from memory.
///
/// Every read is counted, across all archives it hands out.
#[derive(Clone, Default)]
pub struct MockArchiveSource {
    archives: HashMap<String, MockObject>,
    reads: Arc<AtomicUsize>,
}

impl MockArchiveSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_archive(self, path: impl Into<String>, data: Vec<u8>) -> Self {
        self.with_etag(path, data, "\"v1\"")
    }

    pub fn with_etag(mut self, path: impl Into<String>, data: Vec<u8>, etag: &str) -> Self {
        self.archives.insert(
            path.into(),
            MockObject {
                data: Bytes::from(data),
                etag: etag.to_string(),
            },
        );
        self
    }

    /// Number of range reads issued so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn reset_tracking(&self) {
        self.reads.store(0, Ordering::SeqCst);
    }
}

impl ArchiveSource for MockArchiveSource {
    type Source = MockRangeSource;

    fn open(&self, path: &str) -> Result<Self::Source, IoError> {
        Ok(MockRangeSource {
            object: self.archives.get(path).cloned(),
            identifier: format!("mock://{}", path),
            reads: Arc::clone(&self.reads),
        })
    }
}

/// Range source over one in-memory archive; missing archives answer 404.
pub struct MockRangeSource {
    object: Option<MockObject>,
    identifier: String,
    reads: Arc<AtomicUsize>,
}

impl MockRangeSource {
    fn object(&self) -> Result<&MockObject, IoError> {
        self.object
            .as_ref()
            .ok_or_else(|| IoError::NotFound(self.identifier.clone()))
    }
}

#[async_trait]
impl RangeSource for MockRangeSource {
    async fn get_bytes(
        &self,
        offset: u64,
        len: usize,
        if_match: Option<&str>,
    ) -> Result<RangeResponse, IoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let object = self.object()?;

        if let Some(expected) = if_match {
            if expected != object.etag {
                return Err(IoError::PreconditionFailed(self.identifier.clone()));
            }
        }

        Ok(RangeResponse {
            data: slice_window(object.data.clone(), offset, len),
            cache: CacheMetadata {
                etag: Some(object.etag.clone()),
                ..Default::default()
            },
        })
    }

    async fn open_raw(&self, range: Option<&str>) -> Result<RawResponse, IoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let object = self.object()?;
        let total = object.data.len() as u64;

        let cache = CacheMetadata {
            etag: Some(object.etag.clone()),
            cache_control: Some("public, max-age=60".to_string()),
            ..Default::default()
        };

        let window = range.and_then(parse_range);
        let (status, body, content_range) = match window {
            None => (200, object.data.clone(), None),
            Some((start, _)) if start >= total => {
                (416, Bytes::new(), Some(format!("bytes */{}", total)))
            }
            Some((start, end)) => {
                let end = end.unwrap_or(total - 1).min(total - 1);
                (
                    206,
                    object.data.slice(start as usize..=end as usize),
                    Some(format!("bytes {}-{}/{}", start, end, total)),
                )
            }
        };

        Ok(RawResponse {
            status,
            cache,
            content_type: None,
            content_length: Some(body.len() as u64),
            content_range,
            last_modified: None,
            body: Body::from(body),
        })
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Parse `bytes=a-b` or `bytes=a-`.
pub fn parse_range(value: &str) -> Option<(u64, Option<u64>)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start = start.parse().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse().ok()?)
    };
    Some((start, end))
}

// =============================================================================
// Fixtures
// =============================================================================

/// Plain uncompressed MVT archive with a handful of CLU tiles.
pub fn clu_archive() -> Vec<u8> {
    ArchiveBuilder::new()
        .tile(12, 1024, 1535, b"clu-tile-a")
        .tile(12, 1025, 1536, b"clu-tile-b")
        .tile(13, 2048, 3072, b"clu-tile-c")
        .metadata(r#"{"name":"clu"}"#)
        .build()
}
