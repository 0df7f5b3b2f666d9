//! Archive encoding helpers for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use super::directory::DirectoryEntry;
use super::header::HEADER_SIZE;
use crate::error::IoError;
use crate::io::{slice_window, CacheMetadata, RangeResponse, RangeSource, RawResponse};

pub(crate) fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Encode entries the way archive writers do.
pub(crate) fn encode_directory(entries: &[DirectoryEntry]) -> Vec<u8> {
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

/// Build an uncompressed MVT archive with every tile in the root directory.
///
/// `tiles` must be sorted by tile id.
pub(crate) fn build_archive(tiles: &[(u64, &[u8])], metadata: &str) -> Vec<u8> {
    let mut entries = Vec::new();
    let mut data = Vec::new();
    for (tile_id, bytes) in tiles {
        entries.push(DirectoryEntry {
            tile_id: *tile_id,
            offset: data.len() as u64,
            length: bytes.len() as u32,
            run_length: 1,
        });
        data.extend_from_slice(bytes);
    }
    let root = encode_directory(&entries);

    let root_offset = HEADER_SIZE as u64;
    let metadata_offset = root_offset + root.len() as u64;
    let tile_offset = metadata_offset + metadata.len() as u64;

    let mut out = vec![0u8; HEADER_SIZE];
    out[0..7].copy_from_slice(b"PMTiles");
    out[7] = 3;
    out[8..16].copy_from_slice(&root_offset.to_le_bytes());
    out[16..24].copy_from_slice(&(root.len() as u64).to_le_bytes());
    out[24..32].copy_from_slice(&metadata_offset.to_le_bytes());
    out[32..40].copy_from_slice(&(metadata.len() as u64).to_le_bytes());
    out[40..48].copy_from_slice(&tile_offset.to_le_bytes());
    out[56..64].copy_from_slice(&tile_offset.to_le_bytes());
    out[64..72].copy_from_slice(&(data.len() as u64).to_le_bytes());
    out[72..80].copy_from_slice(&(tiles.len() as u64).to_le_bytes());
    out[80..88].copy_from_slice(&(tiles.len() as u64).to_le_bytes());
    out[88..96].copy_from_slice(&(tiles.len() as u64).to_le_bytes());
    out[96] = 1;
    out[97] = 1;
    out[98] = 1;
    out[99] = 1;
    out[101] = 15;

    out.extend_from_slice(&root);
    out.extend_from_slice(metadata.as_bytes());
    out.extend_from_slice(&data);
    out
}

/// In-memory object whose contents and ETag can be swapped mid-test.
pub(crate) struct MemorySource {
    state: Mutex<(Bytes, String)>,
    reads: AtomicUsize,
}

impl MemorySource {
    pub(crate) fn new(data: Vec<u8>, etag: &str) -> Self {
        Self {
            state: Mutex::new((Bytes::from(data), etag.to_string())),
            reads: AtomicUsize::new(0),
        }
    }

    pub(crate) fn replace(&self, data: Vec<u8>, etag: &str) {
        *self.state.lock().unwrap() = (Bytes::from(data), etag.to_string());
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RangeSource for MemorySource {
    async fn get_bytes(
        &self,
        offset: u64,
        len: usize,
        if_match: Option<&str>,
    ) -> Result<RangeResponse, IoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let (data, etag) = self.state.lock().unwrap().clone();
        if let Some(expected) = if_match {
            if expected != etag {
                return Err(IoError::PreconditionFailed("memory://test".to_string()));
            }
        }
        Ok(RangeResponse {
            data: slice_window(data, offset, len),
            cache: CacheMetadata {
                etag: Some(etag),
                ..Default::default()
            },
        })
    }

    async fn open_raw(&self, _range: Option<&str>) -> Result<RawResponse, IoError> {
        Err(IoError::Connection("not supported".to_string()))
    }

    fn identifier(&self) -> &str {
        "memory://test"
    }
}
