use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use firetail::audit::{AuditRecord, AuditSink, HeaderSanitizer};
use firetail::config::FiretailConfig;
use firetail::contract::{ContractIndex, ContractLoader, OpenApiLoader};
use firetail::Pipeline;
use wiremock::MockServer;

/// 同梱のサンプルコントラクトのパス
pub fn sample_api_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/sample_api.json")
}

/// サンプルコントラクトのインデックス
pub fn sample_index() -> Arc<ContractIndex> {
    let (contract, diagnostics) = OpenApiLoader
        .load(&sample_api_path())
        .expect("sample contract loads");
    assert!(diagnostics.is_ok(), "fixture errors: {:?}", diagnostics.errors);
    Arc::new(ContractIndex::new(contract, None))
}

/// 受け取った監査レコードを保持するシンク
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<AuditRecord>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn single(&self) -> AuditRecord {
        let records = self.records();
        assert_eq!(records.len(), 1, "expected exactly one audit record");
        records.into_iter().next().unwrap()
    }
}

impl AuditSink for RecordingSink {
    fn submit(&self, record: AuditRecord) {
        self.records.lock().unwrap().push(record);
    }
}

/// サンプルコントラクトで記録用シンク付きのパイプラインを作成する
#[allow(dead_code)]
pub fn recording_pipeline() -> (Pipeline, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let pipeline = Pipeline::new(sample_index(), HeaderSanitizer::default(), sink.clone());
    (pipeline, sink)
}

/// コレクターのモックに向けた設定
#[allow(dead_code)]
pub fn collector_config(collector: &MockServer) -> FiretailConfig {
    FiretailConfig {
        api_key: "integration-key".to_string(),
        api_host: collector.uri(),
        api_doc_path: sample_api_path().display().to_string(),
        log_max_time: Duration::from_millis(200),
        ..FiretailConfig::default()
    }
}

/// コレクターが受け取ったNDJSON行をすべて返す
#[allow(dead_code)]
pub async fn collected_lines(collector: &MockServer) -> Vec<serde_json::Value> {
    collector
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .flat_map(|request| {
            String::from_utf8_lossy(&request.body)
                .lines()
                .map(|line| serde_json::from_str(line).expect("collector line is JSON"))
                .collect::<Vec<_>>()
        })
        .collect()
}
