//! エラー型定義
//!
//! 起動・設定・コントラクト読み込み・ログ送信の統一エラー型（thiserror使用）。
//!
//! リクエスト単位の検証エラーはここでは扱わない。検証エラーは
//! [`crate::validation::types::ErrorDetail`] として収集され、例外として伝播しない。

use thiserror::Error;

/// Firetail error type
#[derive(Debug, Error)]
pub enum FiretailError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Contract document could not be read
    #[error("Failed to read contract document {path}: {source}")]
    ContractIo {
        /// Document path
        path: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Contract document could not be parsed as JSON or YAML
    #[error("Failed to parse contract document: {0}")]
    ContractParse(String),

    /// Contract loaded with diagnostics; startup must be refused
    #[error("Failed to load OpenAPI spec\nErrors:\n{}", .0.join("\n"))]
    ContractDiagnostics(Vec<String>),

    /// Server socket error
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FiretailError {
    /// Returns a short, stable category name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::ContractIo { .. } => "contract_io",
            Self::ContractParse(_) => "contract_parse",
            Self::ContractDiagnostics(_) => "contract_diagnostics",
            Self::Server(_) => "server",
            Self::Http(_) => "http",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, FiretailError>;
