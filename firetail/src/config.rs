//! Configuration management via environment variables
//!
//! Provides helper functions for reading `FIRETAIL_*` environment variables.
//! Unparseable numeric values fall back to the default with a warning log.

use crate::error::{FiretailError, Result};
use std::time::Duration;

/// Get a non-empty environment variable
///
/// # Returns
/// * `Some(value)` - The environment variable value
/// * `None` - The variable is unset, empty, or not valid Unicode
///
/// # Example
/// ```
/// use firetail::config::get_env;
///
/// let key = get_env("FIRETAIL_API_KEY");
/// ```
pub fn get_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Get an environment variable, or `default` when it is not set
pub fn get_env_or(name: &str, default: &str) -> String {
    get_env(name).unwrap_or_else(|| default.to_string())
}

/// Get an environment variable parsed to a specific type
///
/// # Arguments
/// * `name` - The environment variable name
/// * `default` - Returned if the variable is not set or parsing fails
pub fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    let Some(raw) = get_env(name) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(
                "Environment variable '{}' has an invalid value '{}', using default",
                name,
                raw
            );
            default
        }
    }
}

/// 既定のバッチ上限件数
pub const DEFAULT_LOG_MAX_ITEMS: usize = 1000;

/// 既定のバッチ上限バイト数
pub const DEFAULT_LOG_MAX_SIZE: usize = 950_000;

/// 既定のフラッシュ間隔（ミリ秒）
pub const DEFAULT_LOG_MAX_TIME_MS: u64 = 5_000;

/// Firetail configuration
///
/// 環境変数またはCLIから組み立て、[`FiretailConfig::validate`] で必須項目を確認する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiretailConfig {
    /// コレクターのAPIキー
    pub api_key: String,
    /// コレクターのベースURL（`/logs/bulk` を付けて送信する）
    pub api_host: String,
    /// OpenAPIドキュメントのパス
    pub api_doc_path: String,
    /// ベースパスの上書き（未指定ならドキュメントの `servers[0].url` から導出）
    pub base_path: Option<String>,
    /// 追加で秘匿するヘッダー（リクエスト・レスポンス両方）
    pub sensitive_headers: Vec<String>,
    /// フラッシュする件数
    pub log_max_items: usize,
    /// フラッシュするバイト数
    pub log_max_size: usize,
    /// フラッシュ間隔
    pub log_max_time: Duration,
}

impl Default for FiretailConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_host: String::new(),
            api_doc_path: String::new(),
            base_path: None,
            sensitive_headers: Vec::new(),
            log_max_items: DEFAULT_LOG_MAX_ITEMS,
            log_max_size: DEFAULT_LOG_MAX_SIZE,
            log_max_time: Duration::from_millis(DEFAULT_LOG_MAX_TIME_MS),
        }
    }
}

impl FiretailConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            api_key: get_env_or("FIRETAIL_API_KEY", ""),
            api_host: get_env_or("FIRETAIL_API_HOST", ""),
            api_doc_path: get_env_or("FIRETAIL_API_DOC_PATH", ""),
            base_path: get_env("FIRETAIL_BASE_PATH"),
            sensitive_headers: get_env("FIRETAIL_SENSITIVE_HEADERS")
                .map(|value| parse_header_list(&value))
                .unwrap_or_default(),
            log_max_items: get_env_parse("FIRETAIL_LOG_MAX_ITEMS", DEFAULT_LOG_MAX_ITEMS),
            log_max_size: get_env_parse("FIRETAIL_LOG_MAX_SIZE", DEFAULT_LOG_MAX_SIZE),
            log_max_time: Duration::from_millis(get_env_parse(
                "FIRETAIL_LOG_MAX_TIME_MS",
                DEFAULT_LOG_MAX_TIME_MS,
            )),
        }
    }

    /// 必須項目を確認する
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(FiretailError::Config("Firetail API key is missing".to_string()));
        }
        if self.api_host.trim().is_empty() {
            return Err(FiretailError::Config(
                "Firetail API endpoint is missing".to_string(),
            ));
        }
        if self.api_doc_path.trim().is_empty() {
            return Err(FiretailError::Config(
                "Firetail API doc path is missing".to_string(),
            ));
        }
        if self.log_max_time.is_zero() {
            return Err(FiretailError::Config(
                "Log flush interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// コレクターのバルク送信URL
    pub fn bulk_endpoint(&self) -> String {
        format!("{}/logs/bulk", self.api_host.trim_end_matches('/'))
    }
}

/// カンマ区切りのヘッダー名リストを小文字で分解する
pub fn parse_header_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}
