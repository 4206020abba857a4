use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use base64::{engine::general_purpose, Engine as _};
use tower::ServiceExt;

mod common;

#[tokio::test]
async fn health_reports_dependency_status() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::read_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "artalyze-api");
    assert_eq!(body["dependencies"]["mongodb"]["status"], "healthy");
    assert_eq!(body["dependencies"]["redis"]["status"], "healthy");
}

#[tokio::test]
async fn metrics_require_basic_auth() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let wrong = general_purpose::STANDARD.encode("admin:wrong");
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/metrics")
                .header("authorization", format!("Basic {}", wrong))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn metrics_render_in_prometheus_format() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;

    // Push one request through the stack so the HTTP counters have samples.
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let credentials = general_purpose::STANDARD.encode("admin:changeme");
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/metrics")
                .header("authorization", format!("Basic {}", credentials))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("http_requests_total"));
    assert!(text.contains("http_request_duration_seconds"));
}
