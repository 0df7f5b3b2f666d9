//! Archive checks behind the `check` command.

use super::DatasetId;
use crate::archive::{ArchiveReader, DirectoryCache, Header};
use crate::error::ArchiveError;
use crate::io::ArchiveSource;

/// What a successful check learned about one dataset's archive.
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub dataset: DatasetId,
    pub archive: &'static str,
    pub header: Header,
    pub etag: Option<String>,
    /// `name` from the embedded metadata, if set
    pub name: Option<String>,
}

/// Open the archive backing `dataset` and read its header and metadata.
///
/// Always reads from the origin; no directory cache is involved.
///
/// # Errors
/// Any failure opening the archive or parsing its metadata.
pub async fn check_dataset<A: ArchiveSource>(
    archives: &A,
    dataset: DatasetId,
) -> Result<ArchiveSummary, ArchiveError> {
    let archive = dataset.config().archive;
    let source = archives.open(archive)?;
    let reader = ArchiveReader::open(source, DirectoryCache::Disabled).await?;
    let metadata = reader.metadata().await?;

    Ok(ArchiveSummary {
        dataset,
        archive,
        header: reader.header().clone(),
        etag: reader.etag().map(str::to_string),
        name: metadata
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    })
}
