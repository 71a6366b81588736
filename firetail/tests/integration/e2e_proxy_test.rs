//! 実ポート上のプロキシ経由のエンドツーエンド

use firetail::proxy::UpstreamProxy;
use firetail::server::build_router;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::firetail::recording_pipeline;
use crate::support::http::spawn_server;

#[tokio::test]
async fn proxy_validates_forwards_and_records_client_ip() {
    let upstream = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/v1/instances/db1"))
        .and(body_json(json!({"name": "renamed"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .insert_header("www-authenticate", "Bearer realm=\"api\"")
                .set_body_json(json!({"id": "db1", "name": "renamed"})),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let (pipeline, sink) = recording_pipeline();
    let proxy = UpstreamProxy::new(reqwest::Client::new(), upstream.uri());
    let server = spawn_server(build_router(pipeline, proxy)).await;
    let client = reqwest::Client::new();

    let response = client
        .patch(format!("{}/v1/instances/db1", server.base_url()))
        .header("accept", "application/json")
        .header("authorization", "Bearer token")
        .json(&json!({"name": "renamed"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["name"], "renamed");

    // 未宣言のプロパティは上流に届く前に拒否される
    let rejected = client
        .patch(format!("{}/v1/instances/db1", server.base_url()))
        .header("accept", "application/json")
        .json(&json!({"name": "renamed", "owner": "someone"}))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), 400);
    assert_eq!(
        rejected.headers()["content-type"],
        "application/problem+json"
    );

    server.stop().await;

    let records = sink.records();
    assert_eq!(records.len(), 2);
    let forwarded = &records[0];
    assert_eq!(forwarded.request.ip.as_deref(), Some("127.0.0.1"));
    assert_eq!(forwarded.request.method, "PATCH");
    assert_eq!(forwarded.request.body, r#"{"name":"renamed"}"#);
    assert_eq!(forwarded.request.headers["authorization"], vec!["*****"]);
    assert_eq!(forwarded.response.headers["www-authenticate"], vec!["*****"]);
    assert_eq!(forwarded.response.status_code, 200);
    assert!(records[1]
        .observations
        .iter()
        .any(|o| o.kind == "firetail.request.validation.failed"));
}

#[tokio::test]
async fn unreachable_upstream_is_recorded_as_bad_gateway() {
    let (pipeline, sink) = recording_pipeline();
    let proxy = UpstreamProxy::new(reqwest::Client::new(), "http://127.0.0.1:9");
    let server = spawn_server(build_router(pipeline, proxy)).await;

    let response = reqwest::Client::new()
        .get(format!("{}/v1/performance/unbounded-result-set", server.base_url()))
        .header("accept", "text/plain")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);

    server.stop().await;
    let record = sink.single();
    assert_eq!(record.response.status_code, 502);
    assert_eq!(record.response.original_status_code, 502);
}

#[tokio::test]
async fn wildcard_accept_rejects_plain_text_gateway_error() {
    let (pipeline, sink) = recording_pipeline();
    let proxy = UpstreamProxy::new(reqwest::Client::new(), "http://127.0.0.1:9");
    let server = spawn_server(build_router(pipeline, proxy)).await;

    // */* は application/json として扱われるため、text/plainの502は受け入れられない
    let response = reqwest::Client::new()
        .get(format!("{}/v1/performance/unbounded-result-set", server.base_url()))
        .header("accept", "*/*")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 406);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "firetail.incorrect.response.content.type");
    assert_eq!(body["details"][0]["accept"], "application/json");

    server.stop().await;
    let record = sink.single();
    assert_eq!(record.response.status_code, 406);
    assert_eq!(record.response.original_status_code, 502);
}
