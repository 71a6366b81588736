//! コントラクト検証
//!
//! 検証器は同期的に動作し、エラーは値として蓄積する。

/// ErrorDetail / Observation / 問題ドキュメント
pub mod types;

/// format・型変換の共通チェック
pub mod format;

/// リクエスト検証
pub mod request;

/// レスポンス検証
pub mod response;

pub use types::{ErrorDetail, Observation};
