//! 初期化からコレクター送信までの流れ

use axum::body::Body;
use axum::extract::Path;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use firetail::audit::shipper::{API_KEY_HEADER, NDJSON_CONTENT_TYPE};
use firetail::shutdown::ShutdownController;
use firetail::Firetail;
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::firetail::{collected_lines, collector_config};

async fn collector() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logs/bulk"))
        .and(header(API_KEY_HEADER, "integration-key"))
        .and(header("content-type", NDJSON_CONTENT_TYPE))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

fn instances() -> Router {
    Router::new().route(
        "/v1/instances/:id",
        get(|Path(id): Path<String>| async move { Json(json!({"id": id, "name": "primary"})) }),
    )
}

#[tokio::test]
async fn records_reach_collector_on_shutdown() {
    let collector = collector().await;
    let firetail = Firetail::initialize(
        collector_config(&collector),
        reqwest::Client::new(),
        ShutdownController::new(),
    )
    .unwrap();
    let app = firetail.layer(instances());

    let ok = app
        .clone()
        .oneshot(
            Request::get("/v1/instances/abc")
                .header("host", "api.example.com")
                .header("accept", "application/json")
                .header("authorization", "Bearer secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);

    let blocked = app
        .oneshot(
            Request::get("/v1/instances/NOT_VALID")
                .header("accept", "application/json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(blocked.status(), StatusCode::BAD_REQUEST);

    firetail.shutdown().await;

    let lines = collected_lines(&collector).await;
    assert_eq!(lines.len(), 2, "lines: {lines:?}");

    let informed = lines
        .iter()
        .find(|line| line["logAction"] == "informed")
        .expect("informed record");
    assert_eq!(informed["version"], "1.0.0-alpha");
    assert_eq!(informed["request"]["uri"], "http://api.example.com/v1/instances/abc");
    assert_eq!(informed["request"]["method"], "GET");
    assert_eq!(informed["request"]["resource"], ".instances.{instanceId}");
    assert_eq!(informed["request"]["headers"]["authorization"], json!(["*****"]));
    assert_eq!(informed["response"]["statusCode"], 200);
    assert_eq!(informed["response"]["originalStatusCode"], 200);
    assert!(informed["dateCreated"].as_i64().unwrap() > 0);
    assert!(informed["executionTime"].as_f64().unwrap() >= 0.0);
    assert!(informed["metadata"]["libraryVersion"].is_string());

    let blocked = lines
        .iter()
        .find(|line| line["logAction"] == "blocked")
        .expect("blocked record");
    assert_eq!(blocked["response"]["statusCode"], 400);
    assert_eq!(
        blocked["observations"][0]["type"],
        "firetail.request.validation.failed"
    );
}

#[tokio::test]
async fn timer_flush_ships_without_shutdown() {
    let collector = collector().await;
    let firetail = Firetail::initialize(
        collector_config(&collector),
        reqwest::Client::new(),
        ShutdownController::new(),
    )
    .unwrap();
    let app = firetail.layer(instances());

    let response = app
        .oneshot(
            Request::get("/v1/unknown")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let mut lines = Vec::new();
    for _ in 0..50 {
        lines = collected_lines(&collector).await;
        if !lines.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["observations"][0]["type"], "firetail.route.not.found");
    assert_eq!(firetail.shipper.queued_items(), 0);

    firetail.shutdown().await;
}
