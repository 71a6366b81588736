//! テスト用の共通ヘルパー

use crate::contract::loader::{Diagnostics, OpenApiLoader};
use crate::contract::types::Contract;
use crate::contract::ContractIndex;
use std::sync::Arc;

/// 統合テストと共有するサンプルコントラクト
pub const SAMPLE_API: &str = include_str!("../tests/fixtures/sample_api.json");

pub fn sample_contract_with_diagnostics() -> (Contract, Diagnostics) {
    OpenApiLoader::parse_str(SAMPLE_API).expect("sample fixture parses")
}

pub fn sample_contract() -> Contract {
    let (contract, diagnostics) = sample_contract_with_diagnostics();
    assert!(diagnostics.is_ok(), "fixture errors: {:?}", diagnostics.errors);
    contract
}

pub fn sample_index() -> Arc<ContractIndex> {
    Arc::new(ContractIndex::new(sample_contract(), None))
}

/// 受け取った監査レコードを保持するシンク
#[derive(Default)]
pub struct RecordingSink {
    records: std::sync::Mutex<Vec<crate::audit::AuditRecord>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<crate::audit::AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl crate::audit::AuditSink for RecordingSink {
    fn submit(&self, record: crate::audit::AuditRecord) {
        self.records.lock().unwrap().push(record);
    }
}
