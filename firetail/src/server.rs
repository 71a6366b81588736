//! プロキシサーバーの組み立て・起動・シャットダウンハンドリング

use crate::error::Result;
use crate::pipeline::{firetail_middleware, Pipeline};
use crate::proxy::{proxy_handler, UpstreamProxy};
use crate::shutdown::ShutdownController;
use axum::Router;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::info;

/// 全リクエストを検証したうえで上流へ転送するルーターを作成する
pub fn build_router(pipeline: Pipeline, proxy: UpstreamProxy) -> Router {
    Router::new()
        .fallback(proxy_handler)
        .with_state(proxy)
        .layer(axum::middleware::from_fn_with_state(
            pipeline,
            firetail_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

/// axumサーバーを起動し、シャットダウンシグナルを待機する
pub async fn run(app: Router, bind_addr: &str, shutdown: ShutdownController) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    info!("Firetail proxy listening on {}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    // シグナル経由で停止した場合もシッパーの最終フラッシュを起動する
    shutdown.request_shutdown();
    info!("Server shutdown complete");
    Ok(())
}

/// シャットダウンシグナルを待機
async fn shutdown_signal(shutdown: ShutdownController) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = shutdown.wait() => {
            info!("Shutdown requested, shutting down...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::HeaderSanitizer;
    use crate::test_utils::{sample_index, RecordingSink};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn shutdown_signal_completes_when_controller_requests_shutdown() {
        let shutdown = ShutdownController::default();
        let wait_task = tokio::spawn(shutdown_signal(shutdown.clone()));

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        shutdown.request_shutdown();

        tokio::time::timeout(std::time::Duration::from_secs(2), wait_task)
            .await
            .expect("shutdown signal task timed out")
            .expect("shutdown signal task panicked");
    }

    #[tokio::test]
    async fn test_router_validates_then_forwards() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/instances/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "abc",
                "name": "primary"
            })))
            .expect(1)
            .mount(&upstream)
            .await;

        let sink = Arc::new(RecordingSink::default());
        let pipeline = Pipeline::new(sample_index(), HeaderSanitizer::default(), sink.clone());
        let app = build_router(
            pipeline,
            UpstreamProxy::new(reqwest::Client::new(), upstream.uri()),
        );

        let ok = app
            .clone()
            .oneshot(
                Request::get("/v1/instances/abc")
                    .header("accept", "application/json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let blocked = app
            .oneshot(Request::get("/v1/unknown").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(blocked.status(), StatusCode::NOT_FOUND);

        assert_eq!(sink.records().len(), 2);
    }

    #[tokio::test]
    async fn test_run_reports_bind_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let err = run(Router::new(), &addr, ShutdownController::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "server");
    }
}
