use thiserror::Error;

/// I/O errors that can occur when reading from the archive origin
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Origin answered with a status that is neither 200 nor 206
    #[error("Origin returned HTTP {status} for {identifier}")]
    Status { status: u16, identifier: String },

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The archive changed between two reads (`If-Match` rejected)
    #[error("Archive changed during read: {0}")]
    PreconditionFailed(String),
}

/// Errors raised while decoding a PMTiles archive
#[derive(Debug, Clone, Error)]
pub enum ArchiveError {
    /// I/O error while reading the archive
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Header is malformed or declares something this reader cannot decode
    #[error("Invalid archive: {reason}")]
    InvalidArchive { reason: String },

    /// A directory could not be decoded or points outside the archive
    #[error("Corrupt directory: {reason}")]
    CorruptDirectory { reason: String },

    /// Zoom level beyond what a 64-bit tile id can address
    #[error("Unsupported zoom level {zoom} (maximum is {max})")]
    UnsupportedZoom { zoom: u64, max: u8 },

    /// x or y outside [0, 2^z)
    #[error("Tile coordinate {x}/{y} is outside zoom level {z}")]
    InvalidCoordinate { z: u8, x: u64, y: u64 },
}

impl ArchiveError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        ArchiveError::InvalidArchive {
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        ArchiveError::CorruptDirectory {
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by the tile endpoints
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// The path names a dataset that is not configured
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    /// Valid coordinate with no entry in the archive
    #[error("Tile not found: {dataset}/{z}/{x}/{y}")]
    TileNotFound {
        dataset: String,
        z: u8,
        x: u32,
        y: u32,
    },

    /// Error reading or decoding the archive
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Origin failure outside of archive decoding (passthrough)
    #[error("Origin error: {0}")]
    Origin(#[from] IoError),
}
