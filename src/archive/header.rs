//! PMTiles v3 header parsing.
//!
//! # Layout (127 bytes, little-endian)
//!
//! ```text
//! Bytes   0-6:   Magic "PMTiles"
//! Byte    7:     Spec version (3)
//! Bytes   8-23:  Root directory offset, length
//! Bytes  24-39:  JSON metadata offset, length
//! Bytes  40-55:  Leaf directories offset, length
//! Bytes  56-71:  Tile data offset, length
//! Bytes  72-95:  Addressed tiles, tile entries, tile contents counts
//! Byte   96:     Clustered flag
//! Byte   97:     Internal compression
//! Byte   98:     Tile compression
//! Byte   99:     Tile type
//! Bytes 100-101: Min zoom, max zoom
//! Bytes 102-117: Min lon, min lat, max lon, max lat (i32, degrees * 1e7)
//! Byte  118:     Center zoom
//! Bytes 119-126: Center lon, center lat (i32, degrees * 1e7)
//! ```

use crate::error::ArchiveError;
use crate::io::{read_i32_le, read_u64_le};

// =============================================================================
// Constants
// =============================================================================

/// Magic bytes at the start of every archive
const MAGIC: &[u8; 7] = b"PMTiles";

/// The only spec version this reader understands
pub const SPEC_VERSION: u8 = 3;

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 127;

/// Bytes read when opening an archive. Writers place the header and root
/// directory inside this window so one read usually covers both.
pub const INITIAL_FETCH_SIZE: usize = 16384;

// =============================================================================
// Enums
// =============================================================================

/// Compression applied to directories, metadata or tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    Unknown,
    None,
    Gzip,
    Brotli,
    Zstd,
}

impl Compression {
    fn from_byte(value: u8) -> Result<Self, ArchiveError> {
        match value {
            0 => Ok(Compression::Unknown),
            1 => Ok(Compression::None),
            2 => Ok(Compression::Gzip),
            3 => Ok(Compression::Brotli),
            4 => Ok(Compression::Zstd),
            other => Err(ArchiveError::invalid(format!(
                "unknown compression type {}",
                other
            ))),
        }
    }

    /// The `Content-Encoding` token for this compression, if HTTP has one.
    pub fn content_encoding(&self) -> Option<&'static str> {
        match self {
            Compression::Gzip => Some("gzip"),
            Compression::Brotli => Some("br"),
            Compression::Zstd => Some("zstd"),
            Compression::Unknown | Compression::None => None,
        }
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Compression::Unknown => "unknown",
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Brotli => "brotli",
            Compression::Zstd => "zstd",
        }
    }
}

/// Format of the tiles stored in an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileType {
    Unknown,
    Mvt,
    Png,
    Jpeg,
    Webp,
    Avif,
}

impl TileType {
    fn from_byte(value: u8) -> Result<Self, ArchiveError> {
        match value {
            0 => Ok(TileType::Unknown),
            1 => Ok(TileType::Mvt),
            2 => Ok(TileType::Png),
            3 => Ok(TileType::Jpeg),
            4 => Ok(TileType::Webp),
            5 => Ok(TileType::Avif),
            other => Err(ArchiveError::invalid(format!("unknown tile type {}", other))),
        }
    }

    /// MIME type served for tiles of this type.
    pub fn content_type(&self) -> &'static str {
        match self {
            TileType::Mvt => "application/vnd.mapbox-vector-tile",
            TileType::Png => "image/png",
            TileType::Jpeg => "image/jpeg",
            TileType::Webp => "image/webp",
            TileType::Avif => "image/avif",
            TileType::Unknown => "application/octet-stream",
        }
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            TileType::Unknown => "unknown",
            TileType::Mvt => "mvt",
            TileType::Png => "png",
            TileType::Jpeg => "jpeg",
            TileType::Webp => "webp",
            TileType::Avif => "avif",
        }
    }
}

// =============================================================================
// Header
// =============================================================================

/// Parsed archive header.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub spec_version: u8,
    pub root_dir_offset: u64,
    pub root_dir_length: u64,
    pub metadata_offset: u64,
    pub metadata_length: u64,
    pub leaf_dirs_offset: u64,
    pub leaf_dirs_length: u64,
    pub tile_data_offset: u64,
    pub tile_data_length: u64,
    pub addressed_tiles_count: u64,
    pub tile_entries_count: u64,
    pub tile_contents_count: u64,
    pub clustered: bool,
    pub internal_compression: Compression,
    pub tile_compression: Compression,
    pub tile_type: TileType,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// `[min_lon, min_lat, max_lon, max_lat]` in degrees
    pub bounds: [f64; 4],
    pub center_zoom: u8,
    /// `[lon, lat]` in degrees
    pub center: [f64; 2],
}

impl Header {
    /// Parse a header from the first bytes of an archive.
    ///
    /// # Errors
    /// `InvalidArchive` if the buffer is too short, the magic or version is
    /// wrong, an enum byte is out of range, the zoom range is inverted, or a
    /// section's end overflows a `u64`.
    pub fn parse(bytes: &[u8]) -> Result<Self, ArchiveError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ArchiveError::invalid(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        if &bytes[0..7] != MAGIC {
            return Err(ArchiveError::invalid("missing PMTiles magic bytes"));
        }

        let spec_version = bytes[7];
        if spec_version != SPEC_VERSION {
            return Err(ArchiveError::invalid(format!(
                "unsupported spec version {} (expected {})",
                spec_version, SPEC_VERSION
            )));
        }

        let u64_at = |offset: usize| read_u64_le(&bytes[offset..offset + 8]);
        let degrees_at = |offset: usize| read_i32_le(&bytes[offset..offset + 4]) as f64 / 1e7;

        let header = Header {
            spec_version,
            root_dir_offset: u64_at(8),
            root_dir_length: u64_at(16),
            metadata_offset: u64_at(24),
            metadata_length: u64_at(32),
            leaf_dirs_offset: u64_at(40),
            leaf_dirs_length: u64_at(48),
            tile_data_offset: u64_at(56),
            tile_data_length: u64_at(64),
            addressed_tiles_count: u64_at(72),
            tile_entries_count: u64_at(80),
            tile_contents_count: u64_at(88),
            clustered: bytes[96] == 1,
            internal_compression: Compression::from_byte(bytes[97])?,
            tile_compression: Compression::from_byte(bytes[98])?,
            tile_type: TileType::from_byte(bytes[99])?,
            min_zoom: bytes[100],
            max_zoom: bytes[101],
            bounds: [
                degrees_at(102),
                degrees_at(106),
                degrees_at(110),
                degrees_at(114),
            ],
            center_zoom: bytes[118],
            center: [degrees_at(119), degrees_at(123)],
        };

        if header.min_zoom > header.max_zoom {
            return Err(ArchiveError::invalid(format!(
                "min zoom {} exceeds max zoom {}",
                header.min_zoom, header.max_zoom
            )));
        }

        if header.root_dir_length == 0 {
            return Err(ArchiveError::invalid("empty root directory"));
        }

        let sections = [
            ("root directory", header.root_dir_offset, header.root_dir_length),
            ("metadata", header.metadata_offset, header.metadata_length),
            ("leaf directories", header.leaf_dirs_offset, header.leaf_dirs_length),
            ("tile data", header.tile_data_offset, header.tile_data_length),
        ];
        for (name, offset, length) in sections {
            if offset.checked_add(length).is_none() {
                return Err(ArchiveError::invalid(format!(
                    "{} section {}+{} runs past the largest addressable offset",
                    name, offset, length
                )));
            }
        }

        Ok(header)
    }

    /// Whether the root directory lies entirely inside the first `available`
    /// bytes of the archive.
    pub fn root_within(&self, available: usize) -> bool {
        self.root_dir_offset
            .checked_add(self.root_dir_length)
            .map(|end| end <= available as u64)
            .unwrap_or(false)
    }
}
