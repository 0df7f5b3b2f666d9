//! Access gate integration tests.
//!
//! Tests verify:
//! - Missing and unknown keys get the fixed 401 body
//! - The gate runs before dataset validation and archive I/O
//! - OPTIONS bypasses the gate
//! - A disabled gate lets everything through

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use pmtiles_edge::server::AccessGate;
use pmtiles_edge::{create_dev_router, create_router, RouterConfig};

use super::test_utils::{clu_archive, MockArchiveSource};

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn gated_config() -> RouterConfig {
    RouterConfig::new(vec!["dev".to_string()]).with_tracing(false)
}

async fn assert_unauthorized(response: axum::response::Response) {
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json, serde_json::json!({"error": "Invalid or missing API key"}));
}

#[tokio::test]
async fn test_missing_key_rejected_everywhere() {
    let source = MockArchiveSource::new().with_archive("clu.pmtiles", clu_archive());
    let router = create_router(source.clone(), gated_config());

    for uri in [
        "/clu/12/1024/1535.mvt",
        "/clu.json",
        "/clu.pmtiles",
        "/health",
        "/unknown/path",
    ] {
        assert_unauthorized(router.clone().oneshot(get(uri)).await.unwrap()).await;
    }

    assert_eq!(source.read_count(), 0);
}

#[tokio::test]
async fn test_empty_and_wrong_keys_rejected() {
    let router = create_router(MockArchiveSource::new(), gated_config());

    for uri in [
        "/clu.json?key=",
        "/clu.json?key=DEV",
        "/clu.json?key=dev2",
        "/clu.json?keys=dev",
    ] {
        assert_unauthorized(router.clone().oneshot(get(uri)).await.unwrap()).await;
    }
}

#[tokio::test]
async fn test_gate_runs_before_dataset_validation() {
    let router = create_router(MockArchiveSource::new(), gated_config());

    // An unknown dataset with a bad key must not reveal that it is unknown
    let response = router
        .oneshot(get("/nope/1/0/0.mvt?key=wrong"))
        .await
        .unwrap();
    assert_unauthorized(response).await;
}

#[tokio::test]
async fn test_allow_list_parsing() {
    let router = create_router(
        MockArchiveSource::new(),
        RouterConfig::without_auth()
            .with_gate(AccessGate::from_list(" dev , abc "))
            .with_tracing(false),
    );

    for key in ["dev", "abc"] {
        let uri = format!("/clu.json?key={}", key);
        let response = router.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "key {}", key);
    }

    let response = router.oneshot(get("/clu.json?key=%20dev")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_key_among_other_params() {
    let router = create_router(MockArchiveSource::new(), gated_config());

    let response = router
        .oneshot(get("/clu.json?v=2&key=dev&x=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_options_bypasses_gate() {
    let router = create_router(MockArchiveSource::new(), gated_config());

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/clu.json")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_disabled_gate() {
    let router = create_dev_router(MockArchiveSource::new().with_archive("clu.pmtiles", clu_archive()));

    let response = router
        .clone()
        .oneshot(get("/clu/12/1024/1535.mvt"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
