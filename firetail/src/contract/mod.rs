//! OpenAPIコントラクト
//!
//! ドキュメントの読み込み、不変モデル、パス解決インデックス

/// コントラクトの型定義
pub mod types;

/// OpenAPIドキュメントローダー
pub mod loader;

/// パス + メソッド → オペレーション解決
pub mod index;

pub use index::{ContractIndex, Resolution};
pub use loader::{ContractLoader, Diagnostics, OpenApiLoader};
pub use types::{
    Contract, OperationContract, ParameterContract, ParameterLocation, PathItemContract,
    SchemaNode, SchemaType,
};
