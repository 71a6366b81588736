//! 検証結果の型
//!
//! [`ErrorDetail`] は検証失敗の最小単位、[`Observation`] は監査ログに積まれる1件の記録。
//! `Observation` はそのまま `application/problem+json` のエラードキュメントとしても返される。

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// ルートが存在しない
pub const ROUTE_NOT_FOUND: &str = "firetail.route.not.found";
/// ルートは存在するがメソッドが未定義
pub const METHOD_NOT_FOUND: &str = "firetail.method.not.found";
/// リクエストのContent-Typeを受け付けない
pub const UNSUPPORTED_REQUEST_CONTENT_TYPE: &str = "firetail.unsupported.request.content.type";
/// リクエスト検証失敗
pub const REQUEST_VALIDATION_FAILED: &str = "firetail.request.validation.failed";
/// レスポンス検証失敗
pub const RESPONSE_VALIDATION_FAILED: &str = "firetail.response.validation.failed";
/// レスポンスボディをJSONとして解釈できない
pub const RESPONSE_SANITISATION_FAILED: &str = "firetail.response.sanitisation.failed";
/// レスポンスのContent-TypeがAcceptに含まれない
pub const INCORRECT_RESPONSE_CONTENT_TYPE: &str = "firetail.incorrect.response.content.type";
/// Acceptヘッダーがない
pub const ACCEPT_HEADER_MISSING: &str = "firetail.request.accept.header.missing";
/// パイプライン内部の予期しない障害
pub const MIDDLEWARE_ERROR: &str = "firetail.middleware.error";
/// レスポンス取得中の障害
pub const RESPONSE_HANDLER_FAILED: &str = "firetail.response.handler.failed";

/// 問題ドキュメントのContent-Type
pub const PROBLEM_JSON: &str = "application/problem+json";

/// 検証エラー1件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ErrorDetail {
    /// メッセージ
    pub message: String,
    /// リクエストのAcceptヘッダー
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<String>,
    /// 関連するContent-Type
    #[serde(
        rename = "contenttype",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub content_type: Option<String>,
    /// HTTPステータス（レスポンス側の詳細では0）
    pub status: u16,
}

impl ErrorDetail {
    /// ステータス付きのエラーを作成
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status,
            ..Self::default()
        }
    }

    /// 400 Bad Request
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    /// Acceptヘッダーを付与
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    /// Content-Typeを付与
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// 監査ログに積まれる観測結果（問題ドキュメント兼用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// HTTPステータス（0はレスポンスを差し替えない情報記録）
    pub status: u16,
    /// `firetail.*` 形式の種別
    #[serde(rename = "type")]
    pub kind: String,
    /// タイトル
    pub title: String,
    /// 詳細（発見順）
    pub details: Vec<ErrorDetail>,
}

impl Observation {
    /// 観測結果を作成
    pub fn new(status: u16, kind: &str, title: impl Into<String>, details: Vec<ErrorDetail>) -> Self {
        Self {
            status,
            kind: kind.to_string(),
            title: title.into(),
            details,
        }
    }

    /// レスポンスの差し替えが必要な観測か
    pub fn is_blocking(&self) -> bool {
        self.status >= 400
    }

    /// `details` をJSON文字列化（監査レコード用）
    pub fn details_json(&self) -> String {
        serde_json::to_string(&self.details).unwrap_or_else(|_| "[]".to_string())
    }

    /// 整形済みの問題ドキュメント
    pub fn to_problem_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

impl IntoResponse for Observation {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = self.to_problem_json();
        (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static(PROBLEM_JSON))],
            body,
        )
            .into_response()
    }
}
