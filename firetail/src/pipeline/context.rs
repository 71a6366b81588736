//! リクエスト単位のコンテキスト
//!
//! パイプライン開始時に作成され、パイプラインと検証器だけが更新する。
//! 終了時に監査レコードへ変換される。

use crate::audit::types::LogAction;
use crate::contract::index::Resolution;
use crate::contract::types::{OperationContract, PathItemContract};
use crate::validation::types::Observation;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// リクエストコンテキスト
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// 小文字のHTTPメソッド
    pub method: String,
    /// マッチしたテンプレート（ドット区切り）
    pub matched_template: String,
    /// マッチしたパスアイテム
    pub path_item: Option<Arc<PathItemContract>>,
    /// マッチしたオペレーション（最大1件）
    pub operation: Option<Arc<OperationContract>>,
    /// マッチしたテンプレートから抽出したパスパラメータ
    pub path_parameters: HashMap<String, String>,
    /// 検証のためにバッファしたリクエストボディ
    pub request_body: Option<String>,
    /// 下流のステータス（下流を呼ぶ前は500）
    pub original_status: u16,
    /// 下流の本文
    pub original_body: Option<String>,
    /// 観測結果（発見順）
    pub observations: Vec<Observation>,
    /// エラードキュメントで応答した
    pub intercepted: bool,
    /// レスポンス本文を一度以上解析した
    pub response_sanitised: bool,
    /// 検証段階に到達した
    pub response_validated: bool,
    /// レスポンスを書き換えた
    pub response_modified: bool,
    started: Instant,
}

impl RequestContext {
    /// 新しいコンテキストを作成し、計測を開始する
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_ascii_lowercase(),
            matched_template: String::new(),
            path_item: None,
            operation: None,
            path_parameters: HashMap::new(),
            request_body: None,
            original_status: 500,
            original_body: None,
            observations: Vec::new(),
            intercepted: false,
            response_sanitised: false,
            response_validated: false,
            response_modified: false,
            started: Instant::now(),
        }
    }

    /// 解決結果を取り込む
    pub fn bind(&mut self, resolution: Resolution) {
        self.path_item = resolution.path_item;
        self.operation = resolution.operation;
        self.path_parameters = resolution.path_parameters;
        self.matched_template = resolution.matched_template;
    }

    /// 観測結果を追加
    pub fn observe(&mut self, observation: Observation) {
        self.observations.push(observation);
    }

    /// 経過時間
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// 監査レコードの処理結果
    pub fn log_action(&self) -> LogAction {
        if self.intercepted {
            LogAction::Blocked
        } else if self.response_sanitised && self.response_modified {
            LogAction::Modified
        } else {
            LogAction::Informed
        }
    }

    /// パスアイテムで宣言された秘匿ヘッダー
    pub fn declared_sensitive_headers(&self) -> &[String] {
        self.path_item
            .as_deref()
            .map(|item| item.sensitive_headers.as_slice())
            .unwrap_or_default()
    }
}
