//! 統合テスト共通ヘルパー

pub mod firetail;
pub mod http;
