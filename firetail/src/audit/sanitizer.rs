//! 監査ログ用ヘッダー秘匿

use crate::audit::types::HeaderSnapshot;
use axum::http::HeaderMap;
use std::collections::HashSet;

/// 秘匿後の値
pub const REDACTED: &str = "*****";

/// 既定で秘匿するリクエストヘッダー
pub const DEFAULT_HIDDEN_REQUEST_HEADERS: [&str; 2] = ["authorization", "proxy-authorization"];

/// 既定で秘匿するレスポンスヘッダー
pub const DEFAULT_HIDDEN_RESPONSE_HEADERS: [&str; 2] = ["www-authenticate", "proxy-authenticate"];

/// ヘッダー秘匿
///
/// 既定の秘匿ヘッダー、設定で指定したヘッダー、パスアイテムの
/// `x-ft-sensitive-headers` の和集合を大文字小文字を区別せずに秘匿する。
#[derive(Debug, Clone, Default)]
pub struct HeaderSanitizer {
    configured: Vec<String>,
}

impl HeaderSanitizer {
    /// 設定された秘匿ヘッダーで作成（両方向に適用）
    pub fn new<I, S>(configured: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            configured: configured
                .into_iter()
                .map(|name| name.as_ref().trim().to_ascii_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    /// リクエスト・レスポンスのヘッダーを秘匿したコピーを返す
    pub fn redact(
        &self,
        request_headers: &HeaderMap,
        response_headers: &HeaderMap,
        declared: &[String],
    ) -> (HeaderSnapshot, HeaderSnapshot) {
        let request_hidden = self.hidden_set(&DEFAULT_HIDDEN_REQUEST_HEADERS, declared);
        let response_hidden = self.hidden_set(&DEFAULT_HIDDEN_RESPONSE_HEADERS, declared);
        (
            snapshot(request_headers, &request_hidden),
            snapshot(response_headers, &response_hidden),
        )
    }

    fn hidden_set(&self, defaults: &[&str], declared: &[String]) -> HashSet<String> {
        defaults
            .iter()
            .map(|name| name.to_string())
            .chain(self.configured.iter().cloned())
            .chain(declared.iter().map(|name| name.to_ascii_lowercase()))
            .collect()
    }
}

fn snapshot(headers: &HeaderMap, hidden: &HashSet<String>) -> HeaderSnapshot {
    let mut result = HeaderSnapshot::new();
    for name in headers.keys() {
        let values = if hidden.contains(name.as_str()) {
            vec![REDACTED.to_string()]
        } else {
            headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .collect()
        };
        result.insert(name.as_str().to_string(), values);
    }
    result
}
