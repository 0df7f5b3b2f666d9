//! Directory decoding and lookup.
//!
//! A directory is a run-length index from tile ids to byte windows. On the
//! wire (after decompression) it is a column-oriented sequence of varints:
//!
//! ```text
//! n_entries
//! tile_id deltas   x n   (each relative to the previous id)
//! run_lengths      x n
//! lengths          x n
//! offsets          x n   (0 for i > 0 means "right after the previous entry",
//!                         otherwise value - 1)
//! ```
//!
//! Decoded entries live in a sorted `Vec` and are searched with a binary
//! search for the greatest tile id not above the target.

use crate::error::ArchiveError;

/// One row of a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub tile_id: u64,
    /// Offset relative to the tile data section (or the leaf directory
    /// section when this entry is a leaf pointer)
    pub offset: u64,
    pub length: u32,
    /// Number of consecutive ids sharing these bytes; 0 marks a leaf pointer
    pub run_length: u32,
}

impl DirectoryEntry {
    /// Whether this entry points at a leaf directory rather than tile data.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.run_length == 0
    }
}

/// A decoded directory, sorted ascending by tile id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directory {
    entries: Vec<DirectoryEntry>,
}

impl Directory {
    /// Decode an uncompressed directory.
    pub fn decode(bytes: &[u8]) -> Result<Self, ArchiveError> {
        let mut cursor = VarintCursor::new(bytes);

        let count = cursor.next("entry count")?;
        // Every entry takes at least four varint bytes
        if count > (bytes.len() / 4) as u64 {
            return Err(ArchiveError::corrupt(format!(
                "directory claims {} entries in {} bytes",
                count,
                bytes.len()
            )));
        }
        let count = count as usize;

        let mut entries = Vec::with_capacity(count);
        let mut last_id = 0u64;
        for i in 0..count {
            let delta = cursor.next("tile id")?;
            if i > 0 && delta == 0 {
                return Err(ArchiveError::corrupt(format!(
                    "tile ids not ascending at entry {}",
                    i
                )));
            }
            last_id = last_id
                .checked_add(delta)
                .ok_or_else(|| ArchiveError::corrupt("tile id overflow"))?;
            entries.push(DirectoryEntry {
                tile_id: last_id,
                offset: 0,
                length: 0,
                run_length: 0,
            });
        }

        for entry in entries.iter_mut() {
            entry.run_length = to_u32(cursor.next("run length")?, "run length")?;
        }

        for entry in entries.iter_mut() {
            let length = to_u32(cursor.next("length")?, "length")?;
            if length == 0 {
                return Err(ArchiveError::corrupt(format!(
                    "zero-length entry for tile id {}",
                    entry.tile_id
                )));
            }
            entry.length = length;
        }

        for i in 0..count {
            let value = cursor.next("offset")?;
            let offset = if value == 0 && i > 0 {
                let prev = &entries[i - 1];
                prev.offset
                    .checked_add(u64::from(prev.length))
                    .ok_or_else(|| ArchiveError::corrupt("offset overflow"))?
            } else if value == 0 {
                return Err(ArchiveError::corrupt("first entry has no offset"));
            } else {
                value - 1
            };
            entries[i].offset = offset;
        }

        if !cursor.is_empty() {
            return Err(ArchiveError::corrupt(format!(
                "{} trailing bytes after directory",
                cursor.remaining()
            )));
        }

        Ok(Self { entries })
    }

    /// Build a directory from already sorted entries.
    ///
    /// # Errors
    /// `CorruptDirectory` if the ids are not strictly ascending.
    pub fn from_entries(entries: Vec<DirectoryEntry>) -> Result<Self, ArchiveError> {
        if entries.windows(2).any(|w| w[0].tile_id >= w[1].tile_id) {
            return Err(ArchiveError::corrupt("tile ids not ascending"));
        }
        Ok(Self { entries })
    }

    /// Find the entry covering `tile_id`.
    ///
    /// Returns the greatest entry whose id is not above the target when that
    /// entry is a leaf pointer or its run covers the target.
    pub fn find(&self, tile_id: u64) -> Option<&DirectoryEntry> {
        let index = match self.entries.binary_search_by_key(&tile_id, |e| e.tile_id) {
            Ok(i) => return self.entries.get(i),
            Err(0) => return None,
            Err(i) => i - 1,
        };

        let entry = &self.entries[index];
        if entry.is_leaf() || tile_id - entry.tile_id < entry.run_length as u64 {
            Some(entry)
        } else {
            None
        }
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn to_u32(value: u64, field: &str) -> Result<u32, ArchiveError> {
    u32::try_from(value)
        .map_err(|_| ArchiveError::corrupt(format!("{} {} exceeds u32", field, value)))
}

// =============================================================================
// Varint Reader
// =============================================================================

/// Unsigned LEB128 reader over a byte slice.
struct VarintCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> VarintCursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn next(&mut self, field: &str) -> Result<u64, ArchiveError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = *self.bytes.get(self.pos).ok_or_else(|| {
                ArchiveError::corrupt(format!("truncated varint reading {}", field))
            })?;
            self.pos += 1;

            if shift == 63 && byte > 1 {
                return Err(ArchiveError::corrupt(format!(
                    "varint overflow reading {}",
                    field
                )));
            }
            value |= ((byte & 0x7f) as u64) << shift;

            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(ArchiveError::corrupt(format!(
                    "varint overflow reading {}",
                    field
                )));
            }
        }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}
