//! 監査レコードの組み立て
//!
//! リクエスト開始時に [`RequestInfo`] を取得し、終了時にコンテキストと
//! 最終レスポンスから [`AuditRecord`] を作る。

use crate::audit::sanitizer::HeaderSanitizer;
use crate::audit::types::{
    AuditRecord, ObservationRecord, RecordMetadata, RequestSnapshot, ResponseSnapshot,
    RECORD_VERSION,
};
use crate::pipeline::context::RequestContext;
use axum::extract::ConnectInfo;
use axum::http::{header, request, HeaderMap, Version};
use chrono::Utc;
use once_cell::sync::Lazy;
use std::net::SocketAddr;

/// ライブラリバージョン
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Hostヘッダーにポートがない場合の値
const DEFAULT_PORT: &str = "defaultPort";

static MAC_ADDRESS: Lazy<String> = Lazy::new(primary_mac_address);

static SOFTWARE_VERSION: Lazy<String> = Lazy::new(|| {
    format!(
        "Rust {}-{} firetail/{}",
        std::env::consts::ARCH,
        std::env::consts::OS,
        LIBRARY_VERSION
    )
});

/// リクエスト開始時に取得する情報
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// 完全なURI
    pub uri: String,
    /// 大文字のメソッド
    pub method: String,
    /// 例: `HTTP/1.1`
    pub http_protocol: String,
    /// 受信ヘッダー
    pub headers: HeaderMap,
    /// クライアントIP
    pub ip: Option<String>,
}

impl RequestInfo {
    /// リクエストのパーツから取得
    pub fn capture(parts: &request::Parts) -> Self {
        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .or_else(|| parts.uri.authority().map(|authority| authority.as_str()));
        let uri = match (parts.uri.scheme_str(), host) {
            (Some(_), _) => parts.uri.to_string(),
            (None, Some(host)) => {
                let scheme = parts
                    .headers
                    .get("x-forwarded-proto")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("http");
                let path = parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or("/");
                format!("{scheme}://{host}{path}")
            }
            (None, None) => parts.uri.to_string(),
        };

        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let ip = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        Self {
            uri,
            method: parts.method.as_str().to_ascii_uppercase(),
            http_protocol: protocol_name(parts.version).to_string(),
            headers: parts.headers.clone(),
            ip,
        }
    }

    /// Hostヘッダーのホスト名とポート
    fn host_and_port(&self) -> (Option<String>, Option<String>) {
        let Some(host) = self
            .headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
        else {
            return (None, None);
        };
        match host.parse::<axum::http::uri::Authority>() {
            Ok(authority) => (
                Some(authority.host().to_string()),
                authority.port_u16().map(|port| port.to_string()),
            ),
            Err(_) => (Some(host.to_string()), None),
        }
    }
}

/// 最終的に返したレスポンス
#[derive(Debug, Clone, Default)]
pub struct ResponseInfo {
    /// 返却したステータス
    pub status: u16,
    /// 返却したヘッダー
    pub headers: HeaderMap,
    /// エラードキュメントで差し替えた場合の本文
    pub replaced_body: Option<String>,
}

/// 監査レコードを作成する
pub fn build_record(
    context: &RequestContext,
    request: &RequestInfo,
    response: &ResponseInfo,
    sanitizer: &HeaderSanitizer,
) -> AuditRecord {
    let (request_headers, response_headers) = sanitizer.redact(
        &request.headers,
        &response.headers,
        context.declared_sensitive_headers(),
    );
    let (hostname, port) = request.host_and_port();

    AuditRecord {
        version: RECORD_VERSION.to_string(),
        log_action: context.log_action(),
        date_created: Utc::now().timestamp_millis(),
        execution_time: context.elapsed().as_secs_f64() * 1000.0,
        request: RequestSnapshot {
            http_protocol: request.http_protocol.clone(),
            uri: request.uri.clone(),
            resource: context.matched_template.clone(),
            headers: request_headers,
            method: request.method.clone(),
            body: context.request_body.clone().unwrap_or_default(),
            ip: request.ip.clone(),
        },
        response: ResponseSnapshot {
            status_code: response.status,
            original_status_code: context.original_status,
            body: response.replaced_body.clone().unwrap_or_default(),
            original_body: context.original_body.clone().unwrap_or_default(),
            headers: response_headers,
        },
        metadata: RecordMetadata {
            library_version: LIBRARY_VERSION.to_string(),
            software_version: SOFTWARE_VERSION.clone(),
            local_ip: request.ip.clone(),
            local_port: port.unwrap_or_else(|| DEFAULT_PORT.to_string()),
            hostname: hostname
                .or_else(sysinfo::System::host_name)
                .unwrap_or_default(),
            mac_address: MAC_ADDRESS.clone(),
        },
        observations: context
            .observations
            .iter()
            .map(|observation| ObservationRecord {
                kind: observation.kind.clone(),
                title: observation.title.clone(),
                status: observation.status,
                details: observation.details_json(),
            })
            .collect(),
    }
}

fn protocol_name(version: Version) -> &'static str {
    if version == Version::HTTP_09 {
        "HTTP/0.9"
    } else if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else if version == Version::HTTP_2 {
        "HTTP/2"
    } else if version == Version::HTTP_3 {
        "HTTP/3"
    } else {
        "HTTP/1.1"
    }
}

/// ループバック以外で最初に見つかった有効なMACアドレス
fn primary_mac_address() -> String {
    let networks = sysinfo::Networks::new_with_refreshed_list();
    let mut interfaces: Vec<_> = networks
        .list()
        .iter()
        .filter(|(name, _)| !name.starts_with("lo"))
        .map(|(name, data)| (name.clone(), data.mac_address()))
        .filter(|(_, mac)| !mac.is_unspecified())
        .collect();
    interfaces.sort_by(|a, b| a.0.cmp(&b.0));
    interfaces
        .into_iter()
        .next()
        .map(|(_, mac)| mac.to_string())
        .unwrap_or_default()
}
