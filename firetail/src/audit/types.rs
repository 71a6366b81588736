//! 監査レコードの型定義
//!
//! コレクターへ送るNDJSONの1行に対応する。フィールド名はcamelCase。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 監査レコードのスキーマバージョン
pub const RECORD_VERSION: &str = "1.0.0-alpha";

/// ヘッダー名 → 値リスト
pub type HeaderSnapshot = BTreeMap<String, Vec<String>>;

/// 処理結果の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogAction {
    /// 記録のみ（レスポンスはそのまま）
    Informed,
    /// レスポンスを書き換えた
    Modified,
    /// リクエストまたはレスポンスを遮断した
    Blocked,
}

impl LogAction {
    /// 文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Informed => "informed",
            Self::Modified => "modified",
            Self::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for LogAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 監査レコード
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// スキーマバージョン
    pub version: String,
    /// 処理結果
    pub log_action: LogAction,
    /// 作成時刻（UNIXミリ秒）
    pub date_created: i64,
    /// 処理時間（ミリ秒）
    pub execution_time: f64,
    /// リクエスト
    pub request: RequestSnapshot,
    /// レスポンス
    pub response: ResponseSnapshot,
    /// 実行環境
    pub metadata: RecordMetadata,
    /// 観測結果（発見順）
    pub observations: Vec<ObservationRecord>,
}

/// リクエストのスナップショット
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSnapshot {
    /// 例: `HTTP/1.1`
    pub http_protocol: String,
    /// 完全なURI
    pub uri: String,
    /// マッチしたテンプレート（ドット区切り）
    pub resource: String,
    /// 秘匿済みヘッダー
    pub headers: HeaderSnapshot,
    /// 大文字のHTTPメソッド
    pub method: String,
    /// バッファしたリクエストボディ
    pub body: String,
    /// クライアントIP
    pub ip: Option<String>,
}

/// レスポンスのスナップショット
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSnapshot {
    /// 返却したステータス
    pub status_code: u16,
    /// 下流が返したステータス
    pub original_status_code: u16,
    /// 差し替えた場合の本文
    pub body: String,
    /// 下流が返した本文
    pub original_body: String,
    /// 秘匿済みヘッダー
    pub headers: HeaderSnapshot,
}

/// 実行環境メタデータ
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    /// ライブラリバージョン
    pub library_version: String,
    /// ランタイム情報
    pub software_version: String,
    /// クライアントIP（互換のため `localIP`）
    #[serde(rename = "localIP")]
    pub local_ip: Option<String>,
    /// Hostヘッダーのポート（なければ `defaultPort`）
    pub local_port: String,
    /// ホスト名
    pub hostname: String,
    /// MACアドレス
    #[serde(rename = "macaddress")]
    pub mac_address: String,
}

/// 観測結果のレコード表現
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationRecord {
    /// 種別
    #[serde(rename = "type")]
    pub kind: String,
    /// タイトル
    pub title: String,
    /// ステータス
    pub status: u16,
    /// 詳細（JSON文字列）
    pub details: String,
}
