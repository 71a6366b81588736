//! serve サブコマンド
//!
//! 検証プロキシを起動します。Firetailの設定は環境変数から読み、引数で上書きできます。

use crate::config::{parse_header_list, FiretailConfig};
use clap::Args;
use std::time::Duration;

/// serve サブコマンドの引数
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Listen port
    #[arg(short, long, default_value = "8080", env = "FIRETAIL_PORT")]
    pub port: u16,

    /// Bind address
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "FIRETAIL_HOST")]
    pub host: String,

    /// Upstream service base URL that validated requests are forwarded to
    #[arg(short, long, env = "FIRETAIL_UPSTREAM")]
    pub upstream: String,

    /// OpenAPI document path (overrides FIRETAIL_API_DOC_PATH)
    #[arg(long)]
    pub api_doc: Option<String>,

    /// Collector base URL (overrides FIRETAIL_API_HOST)
    #[arg(long)]
    pub api_host: Option<String>,

    /// Base path override (overrides FIRETAIL_BASE_PATH)
    #[arg(long)]
    pub base_path: Option<String>,

    /// Additional header to redact in audit records (repeatable)
    #[arg(long = "sensitive-header")]
    pub sensitive_headers: Vec<String>,

    /// Flush interval in milliseconds (overrides FIRETAIL_LOG_MAX_TIME_MS)
    #[arg(long)]
    pub log_max_time_ms: Option<u64>,
}

impl ServeArgs {
    /// バインドアドレス
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 環境変数の設定に引数の上書きを適用する
    pub fn apply_overrides(&self, mut config: FiretailConfig) -> FiretailConfig {
        if let Some(path) = &self.api_doc {
            config.api_doc_path = path.clone();
        }
        if let Some(host) = &self.api_host {
            config.api_host = host.clone();
        }
        if let Some(base_path) = &self.base_path {
            config.base_path = Some(base_path.clone());
        }
        for header in self
            .sensitive_headers
            .iter()
            .flat_map(|value| parse_header_list(value))
        {
            if !config.sensitive_headers.contains(&header) {
                config.sensitive_headers.push(header);
            }
        }
        if let Some(ms) = self.log_max_time_ms {
            config.log_max_time = Duration::from_millis(ms);
        }
        config
    }
}
