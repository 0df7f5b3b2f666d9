//! Decoding of compressed directories, metadata and tiles.

use std::io::Read;

use bytes::Bytes;
use flate2::read::GzDecoder;

use super::header::Compression;
use crate::error::ArchiveError;

/// Buffer size handed to the brotli decoder.
const BROTLI_BUFFER_SIZE: usize = 4096;

/// Decode `data` according to `compression`.
///
/// `None` and `Unknown` return the input unchanged.
///
/// # Errors
/// - `InvalidArchive` for zstd, which this reader does not decode
/// - `CorruptDirectory` if the stream is malformed
pub fn decompress(compression: Compression, data: Bytes) -> Result<Bytes, ArchiveError> {
    match compression {
        Compression::None | Compression::Unknown => Ok(data),
        Compression::Gzip => {
            let mut out = Vec::with_capacity(data.len() * 4);
            GzDecoder::new(data.as_ref())
                .read_to_end(&mut out)
                .map_err(|e| ArchiveError::corrupt(format!("gzip decode failed: {}", e)))?;
            Ok(Bytes::from(out))
        }
        Compression::Brotli => {
            let mut out = Vec::with_capacity(data.len() * 4);
            brotli::Decompressor::new(data.as_ref(), BROTLI_BUFFER_SIZE)
                .read_to_end(&mut out)
                .map_err(|e| ArchiveError::corrupt(format!("brotli decode failed: {}", e)))?;
            Ok(Bytes::from(out))
        }
        Compression::Zstd => Err(ArchiveError::invalid("zstd compression is not supported")),
    }
}
