//! Firetail
//!
//! OpenAPIコントラクトに基づいてHTTPトラフィックを検証し、
//! 全リクエストの監査レコードをコレクターへ送信するミドルウェア。

#![warn(missing_docs)]

/// エラー型定義
pub mod error;

/// 設定管理（環境変数ヘルパー）
pub mod config;

/// ロギング初期化ユーティリティ
pub mod logging;

/// コントラクトの読み込みとパス解決
pub mod contract;

/// リクエスト・レスポンスの検証
pub mod validation;

/// リクエスト処理パイプライン
pub mod pipeline;

/// 監査ログ
pub mod audit;

/// 起動時の初期化
pub mod bootstrap;

/// 上流サービスへの転送
pub mod proxy;

/// プロキシサーバー
pub mod server;

/// CLIインターフェース
pub mod cli;

/// Shutdown controller
pub mod shutdown;

#[cfg(test)]
mod test_utils;

pub use bootstrap::Firetail;
pub use error::{FiretailError, Result};
pub use pipeline::{firetail_middleware, Pipeline};
