//! 監査ログ
//!
//! リクエストごとに1件の監査レコードを組み立て、ヘッダーを秘匿したうえで
//! コレクターへまとめて送信する。

/// 監査レコードの型定義
pub mod types;

/// リクエストコンテキストから監査レコードを組み立てる
pub mod record;

/// 秘匿ヘッダーのマスク
pub mod sanitizer;

/// コレクターへの非同期バッチ送信
pub mod shipper;

pub use record::{build_record, RequestInfo, ResponseInfo};
pub use sanitizer::HeaderSanitizer;
pub use shipper::{AuditLogShipper, AuditSink, ShipperConfig};
pub use types::{AuditRecord, LogAction};
