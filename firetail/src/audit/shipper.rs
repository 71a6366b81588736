//! 監査レコードの非同期シッパー
//!
//! レコードはロックフリーのキューに積まれ、バックグラウンドタスクが
//! 件数・バイト数・時間のいずれかの閾値でまとめてコレクターへ送信する。
//!
//! 送信に失敗したバッチはキューへ戻す。戻したレコードは後から積まれた
//! レコードより後に届くことがある。

use crate::audit::types::AuditRecord;
use crate::config::FiretailConfig;
use crate::error::Result;
use crate::shutdown::ShutdownController;
use reqwest::header::CONTENT_TYPE;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// コレクターへ送る本文のContent-Type
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson; charset=utf-8";

/// APIキーを載せるヘッダー名
pub const API_KEY_HEADER: &str = "x-ft-api-key";

/// シッパー設定
#[derive(Debug, Clone)]
pub struct ShipperConfig {
    /// 送信先（`<host>/logs/bulk`）
    pub endpoint: String,
    /// APIキー
    pub api_key: String,
    /// この件数に達したらフラッシュ
    pub max_items: usize,
    /// このバイト数に達したらフラッシュ
    pub max_size: usize,
    /// 閾値に達しなくてもこの間隔でフラッシュ
    pub max_time: Duration,
}

impl From<&FiretailConfig> for ShipperConfig {
    fn from(config: &FiretailConfig) -> Self {
        Self {
            endpoint: config.bulk_endpoint(),
            api_key: config.api_key.clone(),
            max_items: config.log_max_items,
            max_size: config.log_max_size,
            max_time: config.log_max_time,
        }
    }
}

struct Shared {
    tx: mpsc::UnboundedSender<String>,
    queued_bytes: AtomicUsize,
    queued_items: AtomicUsize,
    signal_pending: AtomicBool,
    flush_signal: Notify,
    config: ShipperConfig,
    client: reqwest::Client,
    shutdown: ShutdownController,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// 監査ログシッパー
///
/// Clone可能（内部状態を共有する）。
#[derive(Clone)]
pub struct AuditLogShipper {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for AuditLogShipper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogShipper")
            .field("endpoint", &self.shared.config.endpoint)
            .field("queued_items", &self.queued_items())
            .field("queued_bytes", &self.queued_bytes())
            .finish()
    }
}

impl AuditLogShipper {
    /// シッパーを作成し、フラッシュタスクを起動する
    ///
    /// `shutdown` が要求されるとタスクは最後のフラッシュを行って終了する。
    pub fn start(
        config: ShipperConfig,
        client: reqwest::Client,
        shutdown: ShutdownController,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            tx,
            queued_bytes: AtomicUsize::new(0),
            queued_items: AtomicUsize::new(0),
            signal_pending: AtomicBool::new(false),
            flush_signal: Notify::new(),
            config,
            client,
            shutdown,
            task: Mutex::new(None),
        });

        info!(
            endpoint = %shared.config.endpoint,
            max_items = shared.config.max_items,
            max_size = shared.config.max_size,
            max_time_ms = shared.config.max_time.as_millis() as u64,
            "Audit log shipper started"
        );

        let handle = tokio::spawn(Self::background_task(Arc::clone(&shared), rx));
        if let Ok(mut slot) = shared.task.try_lock() {
            *slot = Some(handle);
        }

        Self { shared }
    }

    /// レコードをシリアライズしてキューに積む
    pub fn enqueue(&self, record: &AuditRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        self.enqueue_line(line);
        Ok(())
    }

    /// シリアライズ済みの1行をキューに積む
    pub fn enqueue_line(&self, line: String) {
        let size = line.len();
        if self.shared.tx.send(line).is_err() {
            warn!("Audit log shipper is stopped, dropping record");
            return;
        }
        let bytes = self.shared.queued_bytes.fetch_add(size, Ordering::SeqCst) + size;
        let items = self.shared.queued_items.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(bytes, items, "Queued audit record");

        let config = &self.shared.config;
        if (bytes >= config.max_size || items >= config.max_items)
            && self
                .shared
                .signal_pending
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            debug!(bytes, items, "Audit log threshold reached, signalling flush");
            self.shared.flush_signal.notify_one();
        }
    }

    /// キュー内の件数
    pub fn queued_items(&self) -> usize {
        self.shared.queued_items.load(Ordering::SeqCst)
    }

    /// キュー内のバイト数（概算）
    pub fn queued_bytes(&self) -> usize {
        self.shared.queued_bytes.load(Ordering::SeqCst)
    }

    /// シャットダウンを要求し、最後のフラッシュ完了まで待つ
    pub async fn shutdown(&self) {
        self.shared.shutdown.request_shutdown();
        let handle = self.shared.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Audit log shipper task ended abnormally: {}", e);
            }
        }
    }

    async fn background_task(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<String>) {
        loop {
            tokio::select! {
                _ = shared.flush_signal.notified() => {}
                _ = tokio::time::sleep(shared.config.max_time) => {}
                _ = shared.shutdown.wait() => break,
            }
            let limit = shared.queued_items.load(Ordering::SeqCst);
            Self::flush(&shared, &mut rx, limit).await;
        }

        info!(
            remaining = shared.queued_items.load(Ordering::SeqCst),
            "Audit log shipper shutting down, running final flush"
        );
        Self::flush(&shared, &mut rx, usize::MAX).await;
        info!("Audit log shipper stopped");
    }

    /// キューから最大 `limit` 件取り出して送信する
    async fn flush(shared: &Shared, rx: &mut mpsc::UnboundedReceiver<String>, limit: usize) {
        let mut batch = Vec::new();
        let mut bytes = 0usize;
        while batch.len() < limit {
            match rx.try_recv() {
                Ok(line) => {
                    bytes += line.len();
                    batch.push(line);
                }
                Err(_) => break,
            }
        }
        shared.signal_pending.store(false, Ordering::SeqCst);

        if batch.is_empty() {
            return;
        }
        saturating_sub(&shared.queued_bytes, bytes);
        saturating_sub(&shared.queued_items, batch.len());

        let count = batch.len();
        match Self::send(shared, batch.join("\n")).await {
            Ok(()) => info!(count, bytes, "Shipped audit records"),
            Err(e) => {
                warn!(
                    count,
                    error = %e,
                    "Failed to ship audit records, requeueing batch"
                );
                for line in batch {
                    let size = line.len();
                    if shared.tx.send(line).is_ok() {
                        shared.queued_bytes.fetch_add(size, Ordering::SeqCst);
                        shared.queued_items.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        }
    }

    async fn send(shared: &Shared, body: String) -> Result<()> {
        shared
            .client
            .post(&shared.config.endpoint)
            .header(API_KEY_HEADER, &shared.config.api_key)
            .header(CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// 完成した監査レコードの受け取り先
///
/// パイプラインはこのトレイト越しにレコードを渡す。送信の失敗はリクエストに影響させない。
pub trait AuditSink: Send + Sync {
    /// レコードを受け取る
    fn submit(&self, record: AuditRecord);
}

impl AuditSink for AuditLogShipper {
    fn submit(&self, record: AuditRecord) {
        if let Err(e) = self.enqueue(&record) {
            warn!(error = %e, "Failed to serialize audit record, dropping it");
        }
    }
}

fn saturating_sub(counter: &AtomicUsize, amount: usize) {
    let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
        Some(current.saturating_sub(amount))
    });
}
