//! Router + oneshot によるパイプラインの契約テスト

use axum::body::Body;
use axum::extract::Path;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use firetail::audit::LogAction;
use firetail::firetail_middleware;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::support::firetail::{recording_pipeline, RecordingSink};
use std::sync::Arc;

fn app() -> (Router, Arc<RecordingSink>) {
    let (pipeline, sink) = recording_pipeline();
    let router = Router::new()
        .route(
            "/v1/instances/:id",
            get(|Path(id): Path<String>| async move {
                Json(json!({"id": id, "name": "primary", "status": null}))
            }),
        )
        .route(
            "/v1/customer-managed-keys",
            post(|| async { StatusCode::CREATED }),
        )
        .route(
            "/v1/performance/inefficient-algorithm",
            get(|| async { Json(json!({"found": true})) }),
        )
        .route(
            "/v1/response-conformance/missing-field",
            get(|| async { Json(json!({"id": "p-1", "name": "Ada"})) }),
        )
        .route(
            "/v1/response-conformance/malformed-json",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "application/json")],
                    "{\"unterminated\": ",
                )
                    .into_response()
            }),
        )
        .layer(axum::middleware::from_fn_with_state(
            pipeline,
            firetail_middleware,
        ));
    (router, sink)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response: Response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn unknown_route_and_unknown_method_are_distinguished() {
    let (app, sink) = app();

    let (status, body) = send(
        app.clone(),
        Request::get("/v1/unknown").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["type"], "firetail.route.not.found");
    assert_eq!(body["status"], 404);

    let (status, body) = send(
        app,
        Request::put("/v1/instances/abc").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["type"], "firetail.method.not.found");
    assert!(body["title"].as_str().unwrap().starts_with("Method put not available"));

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.log_action == LogAction::Blocked));
}

#[tokio::test]
async fn unsupported_content_type_is_rejected() {
    let (app, _) = app();
    let (status, body) = send(
        app,
        Request::post("/v1/customer-managed-keys")
            .header("content-type", "application/xml")
            .body(Body::from("<key/>"))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["type"], "firetail.unsupported.request.content.type");
    assert_eq!(body["details"][0]["contenttype"], "application/xml");
}

#[tokio::test]
async fn invalid_body_reports_every_error() {
    let (app, sink) = app();
    let (status, body) = send(
        app,
        Request::post("/v1/customer-managed-keys")
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .body(Body::from(r#"{"contact": "not-an-email"}"#))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "firetail.request.validation.failed");
    assert_eq!(body["title"], "Failed to validate request");
    let details = body["details"].as_array().unwrap();
    assert!(details.len() >= 4, "details: {details:?}");
    assert!(details.iter().all(|d| d["status"] == 400));
    assert!(details
        .iter()
        .any(|d| d["message"] == "Missing required property: body.key_id"));

    let record = sink.single();
    assert_eq!(record.request.body, r#"{"contact": "not-an-email"}"#);
    assert_eq!(record.response.status_code, 400);
}

#[tokio::test]
async fn query_parameter_bounds_are_enforced() {
    let (app, _) = app();
    let (status, body) = send(
        app,
        Request::get("/v1/performance/inefficient-algorithm?n=0&searchTerm=5")
            .header("accept", "application/json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["details"][0]["message"],
        "query parameter 'n' must be greater than or equal to 1"
    );
}

#[tokio::test]
async fn valid_traffic_passes_through_unchanged() {
    let (app, sink) = app();
    let (status, body) = send(
        app,
        Request::get("/v1/instances/abc123")
            .header("accept", "application/json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"id": "abc123", "name": "primary", "status": null}));

    let record = sink.single();
    assert_eq!(record.log_action, LogAction::Informed);
    assert!(record.observations.is_empty());
    assert_eq!(record.request.resource, ".instances.{instanceId}");
    assert!(record.response.body.is_empty());
    assert!(record.response.original_body.contains("abc123"));
}

#[tokio::test]
async fn nonconforming_response_is_intercepted() {
    let (app, sink) = app();
    let (status, body) = send(
        app,
        Request::get("/v1/response-conformance/missing-field")
            .header("accept", "application/json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["type"], "firetail.response.validation.failed");
    assert_eq!(
        body["details"][0]["message"],
        ".response-conformance.missing-field.age is required but missing."
    );

    let record = sink.single();
    assert_eq!(record.log_action, LogAction::Blocked);
    assert_eq!(record.response.original_status_code, 200);
    assert_eq!(record.response.original_body, r#"{"id":"p-1","name":"Ada"}"#);
}

#[tokio::test]
async fn malformed_response_json_is_reported() {
    let (app, _) = app();
    let (status, body) = send(
        app,
        Request::get("/v1/response-conformance/malformed-json")
            .header("accept", "application/json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["type"], "firetail.response.sanitisation.failed");
}

#[tokio::test]
async fn accept_mismatch_is_not_acceptable() {
    let (app, sink) = app();
    let (status, body) = send(
        app,
        Request::get("/v1/instances/abc")
            .header("accept", "text/html")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
    assert_eq!(body["type"], "firetail.incorrect.response.content.type");
    assert_eq!(body["details"][0]["accept"], "text/html");
    assert_eq!(sink.single().response.original_status_code, 200);
}
