//! Raw archive passthrough tests.
//!
//! Tests verify:
//! - Whole-archive and ranged reads are forwarded with upstream status
//! - Entity headers travel with the bytes
//! - Origin failures map to 502

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use pmtiles_edge::{create_router, RouterConfig};

use super::test_utils::{clu_archive, MockArchiveSource};

fn router() -> axum::Router {
    create_router(
        MockArchiveSource::new().with_archive("clu.pmtiles", clu_archive()),
        RouterConfig::new(vec!["dev".to_string()]).with_tracing(false),
    )
}

fn ranged(uri: &str, range: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("range", range)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_full_archive() {
    let response = router()
        .oneshot(
            Request::builder()
                .uri("/clu.pmtiles?key=dev")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers.get("content-type").unwrap(), "application/octet-stream");
    assert_eq!(headers.get("accept-ranges").unwrap(), "bytes");
    assert_eq!(headers.get("etag").unwrap(), "\"v1\"");
    assert_eq!(headers.get("cache-control").unwrap(), "public, max-age=60");
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.as_ref(), clu_archive().as_slice());
}

#[tokio::test]
async fn test_range_is_forwarded() {
    let total = clu_archive().len();
    let response = router()
        .oneshot(ranged("/clu.pmtiles?key=dev", "bytes=0-6"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers().get("content-range").unwrap().to_str().unwrap(),
        format!("bytes 0-6/{}", total)
    );
    assert_eq!(response.headers().get("content-length").unwrap(), "7");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.as_ref(), b"PMTiles");
}

#[tokio::test]
async fn test_unsatisfiable_range() {
    let response = router()
        .oneshot(ranged("/clu.pmtiles?key=dev", "bytes=999999-"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
}

#[tokio::test]
async fn test_missing_archive_is_bad_gateway() {
    let response = router()
        .oneshot(
            Request::builder()
                .uri("/ssurgo.pmtiles?key=dev")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_passthrough_requires_key() {
    let response = router()
        .oneshot(ranged("/clu.pmtiles", "bytes=0-6"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
