mod common;

use common::{unused_address, TestApp};
use serde_json::{json, Value};
use service_core::lifecycle::ShutdownOutcome;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn liveness_is_ok_without_data_service() {
    let app = TestApp::spawn(&unused_address().await).await;

    let response = app.client().get(app.url("/health/live")).send().await.unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "alive");
}

#[tokio::test]
async fn ready_when_data_service_is_healthy() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ready" })))
        .mount(&upstream)
        .await;
    let app = TestApp::spawn(&upstream.uri()).await;

    let response = app.client().get(app.url("/health/ready")).send().await.unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["data-service"], "up");
}

#[tokio::test]
async fn not_ready_when_data_service_reports_unhealthy() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&upstream)
        .await;
    let app = TestApp::spawn(&upstream.uri()).await;

    let response = app.client().get(app.url("/health/ready")).send().await.unwrap();

    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "not ready");
    assert_eq!(body["checks"]["data-service"], "down");
}

#[tokio::test]
async fn not_ready_when_data_service_is_unreachable() {
    let app = TestApp::spawn(&unused_address().await).await;

    let response = app.client().get(app.url("/health/ready")).send().await.unwrap();

    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn readiness_answers_within_bound_when_data_service_hangs() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&upstream)
        .await;
    let app = TestApp::spawn(&upstream.uri()).await;

    let started = Instant::now();
    let response = app.client().get(app.url("/health/ready")).send().await.unwrap();

    assert_eq!(response.status(), 503);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn shutdown_is_clean() {
    let upstream = MockServer::start().await;
    let app = TestApp::spawn(&upstream.uri()).await;

    assert_eq!(app.stop().await, ShutdownOutcome::Clean);
}
