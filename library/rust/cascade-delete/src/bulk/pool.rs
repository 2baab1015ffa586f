use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bulk::config::{BulkDeleteConfig, TransactionScope};
use crate::bulk::counter::ObjectCounter;
use crate::bulk::event::{DeleteEvent, EventDispatcher};
use crate::bulk::item::DeleteWorkItem;
use crate::bulk::worker::{DeleteWorker, SharedConnection, WorkerConnection, WorkerReport, WorkerState};
use crate::error::{DeleteError, Result};
use crate::session::{ConnectionProvider, RoutineCall, SqlSession};

/// BulkDeleteOutcome は一括削除全体の結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkDeleteOutcome {
    Completed,
    Cancelled,
    Failed,
}

impl fmt::Display for BulkDeleteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// BulkDeleteReport は一括削除の集計。
/// counter と deleted はコミットされたトランザクションの分だけを含む。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkDeleteReport {
    pub outcome: BulkDeleteOutcome,
    pub transaction_scope: TransactionScope,
    pub committed_transactions: usize,
    pub rolled_back_transactions: usize,
    pub counter: ObjectCounter,
    pub attempted: u64,
    pub deleted: u64,
    pub not_found: u64,
    pub failed: u64,
    pub worker_states: Vec<WorkerState>,
    pub duration_ms: u64,
}

impl BulkDeleteReport {
    pub fn is_success(&self) -> bool {
        self.outcome == BulkDeleteOutcome::Completed
    }
}

/// BulkDeleteWorkerPool は削除ルーチンを並列に呼び出すワーカープール。
pub struct BulkDeleteWorkerPool {
    provider: Arc<dyn ConnectionProvider>,
    dispatcher: Arc<dyn EventDispatcher>,
    config: BulkDeleteConfig,
    call: Arc<RoutineCall>,
}

impl BulkDeleteWorkerPool {
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        dispatcher: Arc<dyn EventDispatcher>,
        config: BulkDeleteConfig,
        call: RoutineCall,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            config,
            call: Arc::new(call),
        }
    }

    pub fn config(&self) -> &BulkDeleteConfig {
        &self.config
    }

    /// 接続を確保し、ワーカーを起動する。
    pub async fn start(&self) -> Result<RunningPool> {
        self.config.validate()?;
        let workers = self.config.workers;
        let parent = self.dispatcher.interrupt_signal();
        let signal = parent.child_token();

        let (sender, receiver) = mpsc::channel(self.config.queue_size);
        let queue = Arc::new(Mutex::new(receiver));

        let (connections, shared) = match self.config.transaction_scope {
            TransactionScope::PerWorker => {
                let sessions = self.acquire_sessions(workers).await?;
                let connections = sessions
                    .into_iter()
                    .map(WorkerConnection::Private)
                    .collect::<Vec<_>>();
                (connections, None)
            }
            TransactionScope::SharedGlobal => {
                let session = self.provider.acquire().await?;
                let shared = Arc::new(SharedConnection::new(session, workers));
                let connections = (0..workers)
                    .map(|_| WorkerConnection::Shared(shared.clone()))
                    .collect::<Vec<_>>();
                (connections, Some(shared))
            }
        };

        let handles = connections
            .into_iter()
            .enumerate()
            .map(|(id, connection)| {
                let worker = DeleteWorker::new(
                    id,
                    connection,
                    queue.clone(),
                    self.call.clone(),
                    self.dispatcher.clone(),
                    signal.clone(),
                );
                tokio::spawn(worker.run())
            })
            .collect();

        info!(
            workers,
            queue_size = self.config.queue_size,
            transaction_scope = %self.config.transaction_scope,
            routine = %self.call.routine,
            "bulk delete worker pool started"
        );

        Ok(RunningPool {
            sender: Some(sender),
            handles,
            signal,
            parent,
            shared,
            dispatcher: self.dispatcher.clone(),
            scope: self.config.transaction_scope,
            started: Instant::now(),
        })
    }

    /// 全項目を投入し、完了を待つ。中断された場合は残りを投入しない。
    pub async fn run<I>(&self, items: I) -> Result<BulkDeleteReport>
    where
        I: IntoIterator<Item = DeleteWorkItem>,
    {
        let pool = self.start().await?;
        for item in items {
            if let Err(e) = pool.submit(item).await {
                warn!(error = %e, "stopped submitting delete items");
                break;
            }
        }
        Ok(pool.join().await)
    }

    /// 途中で確保に失敗した場合は、確保済みの接続をロールバックして返す。
    async fn acquire_sessions(&self, count: usize) -> Result<Vec<Box<dyn SqlSession>>> {
        let mut sessions: Vec<Box<dyn SqlSession>> = Vec::with_capacity(count);
        for _ in 0..count {
            match self.provider.acquire().await {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    for mut session in sessions {
                        if let Err(e) = session.rollback().await {
                            warn!(error = %e, "failed to release worker connection");
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(sessions)
    }
}

/// RunningPool は起動済みのワーカープール。join で終了を待つ。
pub struct RunningPool {
    sender: Option<mpsc::Sender<DeleteWorkItem>>,
    handles: Vec<JoinHandle<WorkerReport>>,
    signal: CancellationToken,
    parent: CancellationToken,
    shared: Option<Arc<SharedConnection>>,
    dispatcher: Arc<dyn EventDispatcher>,
    scope: TransactionScope,
    started: Instant,
}

impl RunningPool {
    /// 項目をキューに投入する。キューが満杯なら空きを待つ。
    pub async fn submit(&self, item: DeleteWorkItem) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| DeleteError::Config("worker pool is already closed".to_string()))?;
        tokio::select! {
            biased;
            _ = self.signal.cancelled() => Err(DeleteError::Cancelled),
            sent = sender.send(item) => sent.map_err(|_| DeleteError::Cancelled),
        }
    }

    /// プール内のワーカーが購読している中断シグナル。
    pub fn interrupt_signal(&self) -> CancellationToken {
        self.signal.clone()
    }

    /// キューを閉じ、全ワーカーの終了を待って集計する。
    pub async fn join(mut self) -> BulkDeleteReport {
        drop(self.sender.take());

        let mut reports = Vec::with_capacity(self.handles.len());
        let mut panicked = 0usize;
        for handle in self.handles.drain(..) {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(error = %e, "delete worker terminated abnormally");
                    panicked += 1;
                }
            }
        }

        if let Some(shared) = &self.shared {
            if shared.has_active_workers() {
                shared.abandon(&self.signal).await;
            }
        }

        let report = self.summarize(reports, panicked).await;
        info!(
            outcome = %report.outcome,
            attempted = report.attempted,
            deleted = report.deleted,
            not_found = report.not_found,
            failed = report.failed,
            duration_ms = report.duration_ms,
            "bulk delete finished"
        );
        report
    }

    async fn summarize(&self, reports: Vec<WorkerReport>, panicked: usize) -> BulkDeleteReport {
        let mut counter = ObjectCounter::new();
        let mut committed_transactions = 0;
        let mut rolled_back_transactions = 0;
        let mut deleted = 0;
        let mut commit_failed = false;

        match &self.shared {
            Some(shared) => {
                commit_failed = shared.commit_error().is_some();
                if shared.is_committed() {
                    committed_transactions = 1;
                    let mut merged = ObjectCounter::new();
                    for report in &reports {
                        merged.merge(&report.counter);
                        deleted += report.deleted;
                    }
                    self.publish_counter(&merged).await;
                    counter.merge(&merged);
                } else {
                    rolled_back_transactions = 1;
                }
            }
            None => {
                for report in &reports {
                    if report.commit_error.is_some() {
                        commit_failed = true;
                    }
                    if report.committed == Some(true) {
                        committed_transactions += 1;
                        deleted += report.deleted;
                        self.publish_counter(&report.counter).await;
                        counter.merge(&report.counter);
                    } else {
                        rolled_back_transactions += 1;
                    }
                }
                rolled_back_transactions += panicked;
            }
        }

        let worker_states: Vec<WorkerState> = reports.iter().map(WorkerReport::terminal_state).collect();
        let any_failed = worker_states.contains(&WorkerState::Failed);
        let any_interrupted = worker_states.contains(&WorkerState::Interrupted);
        let outcome = if any_failed || commit_failed || panicked > 0 {
            BulkDeleteOutcome::Failed
        } else if self.parent.is_cancelled() || any_interrupted {
            BulkDeleteOutcome::Cancelled
        } else {
            BulkDeleteOutcome::Completed
        };

        BulkDeleteReport {
            outcome,
            transaction_scope: self.scope,
            committed_transactions,
            rolled_back_transactions,
            counter,
            attempted: reports.iter().map(|r| r.attempted).sum(),
            deleted,
            not_found: reports.iter().map(|r| r.not_found).sum(),
            failed: reports.iter().map(|r| r.failed).sum(),
            worker_states,
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }

    async fn publish_counter(&self, counter: &ObjectCounter) {
        if counter.is_empty() {
            return;
        }
        self.dispatcher
            .publish(DeleteEvent::ObjectCounter {
                counts: counter.as_map().clone(),
            })
            .await;
    }
}
