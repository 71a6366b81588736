//! 起動時の初期化ロジック
//!
//! 設定の検証、コントラクトの読み込みとインデックス化、シッパーの起動を行い、
//! アプリケーションに組み込めるパイプラインを返す。

use crate::audit::{AuditLogShipper, HeaderSanitizer, ShipperConfig};
use crate::config::FiretailConfig;
use crate::contract::{ContractIndex, ContractLoader, OpenApiLoader};
use crate::error::Result;
use crate::pipeline::{firetail_middleware, Pipeline};
use crate::shutdown::ShutdownController;
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// 初期化済みのFiretail
///
/// `shipper` はプロセス終了前に [`Firetail::shutdown`] で停止し、最後のフラッシュを待つこと。
#[derive(Debug, Clone)]
pub struct Firetail {
    /// 検証済み設定
    pub config: FiretailConfig,
    /// コントラクトインデックス
    pub index: Arc<ContractIndex>,
    /// リクエストパイプライン
    pub pipeline: Pipeline,
    /// 監査ログシッパー
    pub shipper: AuditLogShipper,
    /// シャットダウン制御
    pub shutdown: ShutdownController,
}

impl Firetail {
    /// 組み込みのOpenAPIローダーで初期化する
    ///
    /// tokioランタイム上で呼ぶこと（シッパーのタスクを起動する）。
    pub fn initialize(
        config: FiretailConfig,
        client: reqwest::Client,
        shutdown: ShutdownController,
    ) -> Result<Self> {
        Self::initialize_with_loader(config, &OpenApiLoader, client, shutdown)
    }

    /// 任意のローダーで初期化する
    pub fn initialize_with_loader(
        config: FiretailConfig,
        loader: &dyn ContractLoader,
        client: reqwest::Client,
        shutdown: ShutdownController,
    ) -> Result<Self> {
        info!("Firetail v{}", env!("CARGO_PKG_VERSION"));
        config.validate()?;

        let index = Arc::new(load_index(&config, loader)?);
        let shipper =
            AuditLogShipper::start(ShipperConfig::from(&config), client, shutdown.clone());
        let sanitizer = HeaderSanitizer::new(&config.sensitive_headers);
        let pipeline = Pipeline::new(Arc::clone(&index), sanitizer, Arc::new(shipper.clone()));

        Ok(Self {
            config,
            index,
            pipeline,
            shipper,
            shutdown,
        })
    }

    /// ルーターにミドルウェアとして組み込む
    pub fn layer<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(axum::middleware::from_fn_with_state(
            self.pipeline.clone(),
            firetail_middleware,
        ))
    }

    /// シッパーを停止し、残りのレコードを送信する
    pub async fn shutdown(&self) {
        self.shipper.shutdown().await;
    }
}

/// コントラクトを読み込んでインデックスを作る
///
/// 診断にエラーがあれば起動を拒否する。警告はログに出すだけ。
pub fn load_index(config: &FiretailConfig, loader: &dyn ContractLoader) -> Result<ContractIndex> {
    let (contract, diagnostics) = loader.load(Path::new(&config.api_doc_path))?;
    for warning in &diagnostics.warnings {
        warn!(path = %config.api_doc_path, "{}", warning);
    }
    let diagnostics = diagnostics.into_result()?;

    let index = ContractIndex::new(contract, config.base_path.as_deref());
    info!(
        path = %config.api_doc_path,
        openapi = diagnostics.specification_version.as_deref().unwrap_or("unknown"),
        operations = index.contract().operation_count(),
        base_path = %index.base_path(),
        "Contract loaded"
    );
    Ok(index)
}
