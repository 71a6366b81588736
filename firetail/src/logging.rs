//! ロギング初期化ユーティリティ
//!
//! ログレベルは `FIRETAIL_LOG_LEVEL`、なければ `RUST_LOG` から読む（既定は `info`）。

use crate::error::{FiretailError, Result};
use tracing_subscriber::EnvFilter;

/// 既定のログレベル
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// 環境変数からフィルタ文字列を決定する
pub fn filter_directive() -> String {
    std::env::var("FIRETAIL_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

/// グローバルなtracingサブスクライバーを初期化する
pub fn init() -> Result<()> {
    let filter = EnvFilter::try_new(filter_directive())
        .map_err(|e| FiretailError::Config(format!("invalid log filter: {e}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| FiretailError::Config(format!("failed to initialize logging: {e}")))
}
