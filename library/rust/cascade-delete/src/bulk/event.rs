use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// DeleteEvent は一括削除の進捗・件数・中断を通知するイベント。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteEvent {
    /// 1 件の処理を試みた（見つからない・失敗も含む）
    ProgressTick { worker_id: usize },
    /// コミットされたトランザクションの削除件数
    ObjectCounter { counts: BTreeMap<i32, u64> },
    /// 中断要求。global が true なら全ワーカーが停止する
    Interrupt {
        message: String,
        cause: Option<String>,
        global: bool,
    },
}

/// EventDispatcher はイベントの発行と中断シグナルの購読を提供する。
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    async fn publish(&self, event: DeleteEvent);

    /// プロセス全体で共有される中断シグナル。
    fn interrupt_signal(&self) -> CancellationToken;
}

/// InMemoryEventDispatcher は発行されたイベントを記録する。
/// global な中断イベントを受けると中断シグナルを発火する。
#[derive(Clone, Default)]
pub struct InMemoryEventDispatcher {
    events: Arc<RwLock<Vec<DeleteEvent>>>,
    token: CancellationToken,
}

impl InMemoryEventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 外部からの中断要求。
    pub async fn interrupt(&self, message: impl Into<String>) {
        self.publish(DeleteEvent::Interrupt {
            message: message.into(),
            cause: None,
            global: true,
        })
        .await;
    }

    pub async fn events(&self) -> Vec<DeleteEvent> {
        self.events.read().await.clone()
    }

    pub async fn progress_ticks(&self) -> usize {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| matches!(e, DeleteEvent::ProgressTick { .. }))
            .count()
    }

    pub async fn interrupts(&self) -> Vec<DeleteEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| matches!(e, DeleteEvent::Interrupt { .. }))
            .cloned()
            .collect()
    }

    /// ObjectCounter イベントの件数を合算する。
    pub async fn counted_total(&self) -> u64 {
        self.events
            .read()
            .await
            .iter()
            .map(|e| match e {
                DeleteEvent::ObjectCounter { counts } => counts.values().sum(),
                _ => 0,
            })
            .sum()
    }
}

#[async_trait]
impl EventDispatcher for InMemoryEventDispatcher {
    async fn publish(&self, event: DeleteEvent) {
        let global = matches!(event, DeleteEvent::Interrupt { global: true, .. });
        self.events.write().await.push(event);
        if global {
            self.token.cancel();
        }
    }

    fn interrupt_signal(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// LoggingEventDispatcher はイベントを tracing に出力する。
/// 進捗は report_every 件ごとに集約して出力する。
pub struct LoggingEventDispatcher {
    token: CancellationToken,
    ticks: AtomicU64,
    report_every: u64,
}

impl LoggingEventDispatcher {
    pub fn new(report_every: u64) -> Self {
        Self {
            token: CancellationToken::new(),
            ticks: AtomicU64::new(0),
            report_every: report_every.max(1),
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventDispatcher for LoggingEventDispatcher {
    async fn publish(&self, event: DeleteEvent) {
        match event {
            DeleteEvent::ProgressTick { .. } => {
                let ticks = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
                if ticks % self.report_every == 0 {
                    info!(processed = ticks, "bulk delete progress");
                }
            }
            DeleteEvent::ObjectCounter { counts } => {
                for (objectclass_id, count) in counts {
                    info!(objectclass_id, count, "objects deleted");
                }
            }
            DeleteEvent::Interrupt {
                message,
                cause,
                global,
            } => {
                warn!(message = %message, cause = ?cause, global, "bulk delete interrupted");
                if global {
                    self.token.cancel();
                }
            }
        }
    }

    fn interrupt_signal(&self) -> CancellationToken {
        self.token.clone()
    }
}
