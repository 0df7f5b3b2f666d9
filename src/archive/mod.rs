//! PMTiles v3 archive decoding.
//!
//! This module turns byte ranges from a [`RangeSource`](crate::io::RangeSource)
//! into tiles:
//!
//! - `header`: the fixed 127-byte header
//! - `directory`: varint-encoded directories and run-length lookup
//! - `tile_id`: Hilbert-curve tile ids
//! - `reader`: the lookup chain tying them together
//! - `cache`: optional sharing of parsed heads and leaf directories

mod cache;
mod compression;
mod directory;
mod header;
mod reader;
mod tile_id;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{DirectoryCache, MemoryDirectoryCache};
pub use compression::decompress;
pub use directory::{Directory, DirectoryEntry};
pub use header::{Compression, Header, TileType, HEADER_SIZE, INITIAL_FETCH_SIZE, SPEC_VERSION};
pub use reader::{ArchiveHead, ArchiveReader, TileData, TileLocation, MAX_DIRECTORY_DEPTH};
pub use tile_id::{tile_id_to_zxy, zxy_to_tile_id, TileCoord, MAX_ZOOM};
