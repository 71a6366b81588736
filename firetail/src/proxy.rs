//! 上流サービスへの転送
//!
//! スタンドアロンのプロキシとして動かす場合の下流ハンドラー。
//! メソッド・パス・クエリ・ヘッダー・ボディをそのまま上流へ渡し、レスポンスはストリームで返す。

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use std::io;
use tracing::{debug, warn};

/// 転送しないホップバイホップヘッダー
const HOP_BY_HOP_HEADERS: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// 上流プロキシ
#[derive(Debug, Clone)]
pub struct UpstreamProxy {
    client: reqwest::Client,
    base_url: String,
}

impl UpstreamProxy {
    /// 上流のベースURLを指定して作成する
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// 上流のベースURL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// リクエストを上流へ転送する（失敗時は502）
    pub async fn forward(&self, request: Request<Body>) -> Response {
        let (parts, body) = request.into_parts();
        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", self.base_url, path);

        let mut headers = strip_hop_by_hop(&parts.headers);
        headers.remove(header::HOST);

        let body = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to read request body for upstream");
                return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
            }
        };

        let result = self
            .client
            .request(parts.method.clone(), &url)
            .headers(headers)
            .body(body)
            .send()
            .await;

        match result {
            Ok(upstream) => {
                debug!(
                    method = %parts.method,
                    url = %url,
                    status = upstream.status().as_u16(),
                    "Forwarded request upstream"
                );
                stream_response(upstream)
            }
            Err(e) => {
                warn!(method = %parts.method, url = %url, error = %e, "Upstream request failed");
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
        }
    }
}

/// ルーターのフォールバックとして使うハンドラー
pub async fn proxy_handler(State(proxy): State<UpstreamProxy>, request: Request<Body>) -> Response {
    proxy.forward(request).await
}

fn stream_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let headers = strip_hop_by_hop(upstream.headers());
    let stream = upstream.bytes_stream().map_err(io::Error::other);
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    // Connectionヘッダーで列挙されたヘッダーもホップバイホップとして扱う
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let lower = name.as_str();
        if HOP_BY_HOP_HEADERS.contains(&lower) || listed.iter().any(|l| l == lower) {
            continue;
        }
        forwarded.append(HeaderName::clone(name), value.clone());
    }
    forwarded
}
