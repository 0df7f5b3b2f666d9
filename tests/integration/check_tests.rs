//! `check` command tests.
//!
//! Tests verify:
//! - Healthy archives report their header, ETag and metadata name
//! - Missing, malformed and metadata-broken archives fail
//! - Checks always read from the origin

use pmtiles_edge::archive::{Compression, TileType};
use pmtiles_edge::dataset::check_dataset;
use pmtiles_edge::{ArchiveError, DatasetId, IoError};

use super::test_utils::{clu_archive, ArchiveBuilder, MockArchiveSource};

#[tokio::test]
async fn test_check_healthy_archive() {
    let source = MockArchiveSource::new().with_etag("clu.pmtiles", clu_archive(), "\"clu-7\"");

    let summary = check_dataset(&source, DatasetId::Clu).await.unwrap();
    assert_eq!(summary.dataset, DatasetId::Clu);
    assert_eq!(summary.archive, "clu.pmtiles");
    assert_eq!(summary.header.tile_type, TileType::Mvt);
    assert_eq!(summary.header.max_zoom, 13);
    assert_eq!(summary.etag.as_deref(), Some("\"clu-7\""));
    assert_eq!(summary.name.as_deref(), Some("clu"));
}

#[tokio::test]
async fn test_check_reads_origin_every_time() {
    let source = MockArchiveSource::new().with_archive("clu.pmtiles", clu_archive());

    check_dataset(&source, DatasetId::Clu).await.unwrap();
    let first = source.read_count();
    assert!(first > 0);

    check_dataset(&source, DatasetId::Clu).await.unwrap();
    assert_eq!(source.read_count(), first * 2);
}

#[tokio::test]
async fn test_check_archive_without_name() {
    let archive = ArchiveBuilder::new()
        .tile(5, 3, 3, b"tile")
        .tile_compression(Compression::Gzip)
        .metadata(r#"{"vector_layers":[]}"#)
        .build();
    let source = MockArchiveSource::new().with_archive("plss.pmtiles", archive);

    let summary = check_dataset(&source, DatasetId::Plss).await.unwrap();
    assert_eq!(summary.header.tile_compression, Compression::Gzip);
    assert!(summary.name.is_none());
}

#[tokio::test]
async fn test_check_missing_archive() {
    let source = MockArchiveSource::new().with_archive("clu.pmtiles", clu_archive());

    let result = check_dataset(&source, DatasetId::Ssurgo).await;
    assert!(matches!(result, Err(ArchiveError::Io(IoError::NotFound(_)))));
}

#[tokio::test]
async fn test_check_malformed_archive() {
    let source =
        MockArchiveSource::new().with_archive("cdl.pmtiles", b"<html>gateway</html>".to_vec());

    let result = check_dataset(&source, DatasetId::Cdl).await;
    assert!(matches!(result, Err(ArchiveError::InvalidArchive { .. })));
}

#[tokio::test]
async fn test_check_broken_metadata() {
    let archive = ArchiveBuilder::new()
        .tile(5, 3, 3, b"tile")
        .metadata("{not json")
        .build();
    let source = MockArchiveSource::new().with_archive("clu.pmtiles", archive);

    let result = check_dataset(&source, DatasetId::Clu).await;
    assert!(matches!(result, Err(ArchiveError::InvalidArchive { .. })));
}
