use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bulk::counter::ObjectCounter;
use crate::bulk::event::{DeleteEvent, EventDispatcher};
use crate::bulk::item::{DeleteOutcome, DeleteWorkItem};
use crate::error::DeleteError;
use crate::session::{RoutineCall, SqlSession};

/// WorkerState はワーカーの状態。
/// Idle → Running → (Success | Interrupted | Failed) → Shutdown の順に遷移する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Running,
    Success,
    Interrupted,
    Failed,
    Shutdown,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Success => "success",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
            Self::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// WorkerReport は終了したワーカー 1 つの集計。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker_id: usize,
    /// 遷移した状態の履歴
    pub states: Vec<WorkerState>,
    /// このワーカーのトランザクションで削除した件数（コミット前）
    pub counter: ObjectCounter,
    pub attempted: u64,
    pub deleted: u64,
    pub not_found: u64,
    pub failed: u64,
    /// 専用接続の場合のみ、コミットできたかどうか
    pub committed: Option<bool>,
    pub commit_error: Option<String>,
}

impl WorkerReport {
    fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            states: vec![WorkerState::Idle],
            counter: ObjectCounter::new(),
            attempted: 0,
            deleted: 0,
            not_found: 0,
            failed: 0,
            committed: None,
            commit_error: None,
        }
    }

    /// Shutdown の直前に記録された終了状態。
    pub fn terminal_state(&self) -> WorkerState {
        self.states
            .iter()
            .rev()
            .copied()
            .find(|s| matches!(s, WorkerState::Success | WorkerState::Interrupted | WorkerState::Failed))
            .unwrap_or(WorkerState::Idle)
    }
}

/// SharedConnection は全ワーカーで共有する接続と 1 つのトランザクション。
/// 1 件の処理中は排他ロックを保持する。
pub(crate) struct SharedConnection {
    session: Mutex<Box<dyn SqlSession>>,
    rollback_only: AtomicBool,
    active: AtomicUsize,
    committed: AtomicBool,
    commit_error: std::sync::Mutex<Option<String>>,
}

impl SharedConnection {
    pub(crate) fn new(session: Box<dyn SqlSession>, workers: usize) -> Self {
        Self {
            session: Mutex::new(session),
            rollback_only: AtomicBool::new(false),
            active: AtomicUsize::new(workers),
            committed: AtomicBool::new(false),
            commit_error: std::sync::Mutex::new(None),
        }
    }

    pub(crate) fn is_committed(&self) -> bool {
        self.committed.load(Ordering::SeqCst)
    }

    pub(crate) fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }

    pub(crate) fn commit_error(&self) -> Option<String> {
        self.commit_error.lock().ok().and_then(|e| e.clone())
    }

    pub(crate) fn has_active_workers(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }

    /// ワーカーの終了を記録する。最後のワーカーがコミットかロールバックを決める。
    pub(crate) async fn release(&self, terminal: WorkerState, signal: &CancellationToken) {
        if terminal != WorkerState::Success {
            self.rollback_only.store(true, Ordering::SeqCst);
        }
        if self.active.fetch_sub(1, Ordering::SeqCst) != 1 {
            return;
        }
        self.finish(signal).await;
    }

    /// 終了を記録できなかったワーカーがいる場合に、トランザクションを破棄する。
    pub(crate) async fn abandon(&self, signal: &CancellationToken) {
        self.rollback_only.store(true, Ordering::SeqCst);
        self.active.store(0, Ordering::SeqCst);
        self.finish(signal).await;
    }

    /// 残っているワーカーがいない状態でトランザクションを確定する。
    async fn finish(&self, signal: &CancellationToken) {
        let mut session = self.session.lock().await;
        if self.is_rollback_only() || signal.is_cancelled() {
            if let Err(e) = session.rollback().await {
                warn!(error = %e, "failed to roll back shared transaction");
            }
            info!("shared transaction rolled back");
            return;
        }
        match session.commit().await {
            Ok(()) => {
                self.committed.store(true, Ordering::SeqCst);
                info!("shared transaction committed");
            }
            Err(e) => {
                error!(error = %e, "failed to commit shared transaction");
                if let Ok(mut slot) = self.commit_error.lock() {
                    *slot = Some(e.to_string());
                }
                if let Err(e) = session.rollback().await {
                    warn!(error = %e, "failed to roll back shared transaction");
                }
            }
        }
    }
}

pub(crate) enum WorkerConnection {
    Private(Box<dyn SqlSession>),
    Shared(Arc<SharedConnection>),
}

pub(crate) type WorkQueue = Arc<Mutex<mpsc::Receiver<DeleteWorkItem>>>;

/// DeleteWorker はキューから 1 件ずつ取り出し、削除ルーチンを呼び出す。
pub(crate) struct DeleteWorker {
    id: usize,
    connection: WorkerConnection,
    queue: WorkQueue,
    call: Arc<RoutineCall>,
    dispatcher: Arc<dyn EventDispatcher>,
    signal: CancellationToken,
    report: WorkerReport,
}

impl DeleteWorker {
    pub(crate) fn new(
        id: usize,
        connection: WorkerConnection,
        queue: WorkQueue,
        call: Arc<RoutineCall>,
        dispatcher: Arc<dyn EventDispatcher>,
        signal: CancellationToken,
    ) -> Self {
        Self {
            id,
            connection,
            queue,
            call,
            dispatcher,
            signal,
            report: WorkerReport::new(id),
        }
    }

    pub(crate) async fn run(mut self) -> WorkerReport {
        self.report.states.push(WorkerState::Running);
        let terminal = self.process_items().await;
        self.report.states.push(terminal);
        self.shutdown(terminal).await;
        self.report.states.push(WorkerState::Shutdown);
        debug!(worker_id = self.id, state = %terminal, attempted = self.report.attempted, "delete worker finished");
        self.report
    }

    /// 次の項目を待つ。中断シグナルで待機を打ち切る。
    async fn next_item(&self) -> Option<DeleteWorkItem> {
        tokio::select! {
            biased;
            _ = self.signal.cancelled() => None,
            item = async { self.queue.lock().await.recv().await } => item,
        }
    }

    async fn process_items(&mut self) -> WorkerState {
        loop {
            // 中断は項目と項目の間でのみ確認する
            let Some(item) = self.next_item().await else {
                return if self.signal.is_cancelled() {
                    WorkerState::Interrupted
                } else {
                    WorkerState::Success
                };
            };

            match self.delete(&item).await {
                Ok(Some(outcome)) => {
                    self.report.attempted += 1;
                    self.record(&item, outcome);
                    self.tick().await;
                }
                Ok(None) => {
                    debug!(worker_id = self.id, object_id = item.object_id, "shared transaction is rollback-only, stopping");
                    return WorkerState::Interrupted;
                }
                Err(e) => {
                    self.report.attempted += 1;
                    self.report.failed += 1;
                    self.tick().await;
                    self.fail(&item, e).await;
                    return WorkerState::Failed;
                }
            }
        }
    }

    /// ルーチンを 1 回呼び出す。共有接続がロールバック専用なら None。
    async fn delete(&mut self, item: &DeleteWorkItem) -> Result<Option<DeleteOutcome>, DeleteError> {
        match &mut self.connection {
            WorkerConnection::Private(session) => {
                let returned = session.call_routine(&self.call, item.object_id).await?;
                Ok(Some(DeleteOutcome::from_returned(item.object_id, returned)))
            }
            WorkerConnection::Shared(shared) => {
                let mut session = shared.session.lock().await;
                if shared.is_rollback_only() {
                    return Ok(None);
                }
                match session.call_routine(&self.call, item.object_id).await {
                    Ok(returned) => Ok(Some(DeleteOutcome::from_returned(item.object_id, returned))),
                    Err(e) => {
                        // ロックを保持したままフラグを立て、以降のコミットを防ぐ
                        shared.rollback_only.store(true, Ordering::SeqCst);
                        Err(e)
                    }
                }
            }
        }
    }

    fn record(&mut self, item: &DeleteWorkItem, outcome: DeleteOutcome) {
        match outcome {
            DeleteOutcome::Deleted => {
                self.report.deleted += 1;
                self.report.counter.increment(item.objectclass_id);
                debug!(worker_id = self.id, object_id = item.object_id, "object deleted");
            }
            DeleteOutcome::NotFound => {
                self.report.not_found += 1;
                warn!(
                    worker_id = self.id,
                    object_id = item.object_id,
                    objectclass = %item.objectclass_name,
                    "object not found, nothing was deleted"
                );
            }
        }
    }

    async fn tick(&self) {
        self.dispatcher
            .publish(DeleteEvent::ProgressTick { worker_id: self.id })
            .await;
    }

    async fn fail(&self, item: &DeleteWorkItem, cause: DeleteError) {
        let err = DeleteError::ItemDelete {
            object_id: item.object_id,
            message: cause.to_string(),
        };
        error!(worker_id = self.id, object_id = item.object_id, error = %err, "delete routine failed");

        let global = matches!(self.connection, WorkerConnection::Shared(_));
        self.dispatcher
            .publish(DeleteEvent::Interrupt {
                message: format!("worker {} stopped after a failed delete", self.id),
                cause: Some(err.to_string()),
                global,
            })
            .await;
        if global {
            self.signal.cancel();
        }
    }

    /// 専用接続はここでコミットまたはロールバックする。
    /// 共有接続は最後に終了したワーカーが確定する。
    async fn shutdown(&mut self, terminal: WorkerState) {
        match &mut self.connection {
            WorkerConnection::Private(session) => {
                if terminal == WorkerState::Success {
                    match session.commit().await {
                        Ok(()) => self.report.committed = Some(true),
                        Err(e) => {
                            error!(worker_id = self.id, error = %e, "failed to commit worker transaction");
                            self.report.committed = Some(false);
                            self.report.commit_error = Some(e.to_string());
                            if let Err(e) = session.rollback().await {
                                warn!(worker_id = self.id, error = %e, "failed to roll back worker transaction");
                            }
                        }
                    }
                } else {
                    if let Err(e) = session.rollback().await {
                        warn!(worker_id = self.id, error = %e, "failed to roll back worker transaction");
                    }
                    self.report.committed = Some(false);
                }
            }
            WorkerConnection::Shared(shared) => {
                shared.release(terminal, &self.signal).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::event::InMemoryEventDispatcher;
    use crate::session::MockSqlSession;

    fn call() -> Arc<RoutineCall> {
        Arc::new(RoutineCall {
            routine: "del_cityobject".to_string(),
            sql: "SELECT citydb.del_cityobject($1)".to_string(),
        })
    }

    async fn queue_with(items: Vec<DeleteWorkItem>) -> WorkQueue {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            tx.send(item).await.unwrap();
        }
        Arc::new(Mutex::new(rx))
    }

    #[tokio::test]
    async fn test_private_worker_commits_on_success() {
        let mut session = MockSqlSession::new();
        session
            .expect_call_routine()
            .returning(|_, id| Ok(if id == 2 { None } else { Some(id) }));
        session.expect_commit().times(1).returning(|| Ok(()));
        session.expect_rollback().never();

        let dispatcher = Arc::new(InMemoryEventDispatcher::new());
        let queue = queue_with(vec![
            DeleteWorkItem::new(1, 26, "Building"),
            DeleteWorkItem::new(2, 26, "Building"),
        ])
        .await;
        let worker = DeleteWorker::new(
            0,
            WorkerConnection::Private(Box::new(session)),
            queue,
            call(),
            dispatcher.clone(),
            CancellationToken::new(),
        );

        let report = worker.run().await;
        assert_eq!(
            report.states,
            vec![
                WorkerState::Idle,
                WorkerState::Running,
                WorkerState::Success,
                WorkerState::Shutdown
            ]
        );
        assert_eq!(report.deleted, 1);
        assert_eq!(report.not_found, 1);
        assert_eq!(report.committed, Some(true));
        assert_eq!(dispatcher.progress_ticks().await, 2);
    }

    #[tokio::test]
    async fn test_private_worker_rolls_back_on_failure() {
        let mut session = MockSqlSession::new();
        session
            .expect_call_routine()
            .returning(|_, _| Err(DeleteError::Database("deadlock detected".to_string())));
        session.expect_commit().never();
        session.expect_rollback().times(1).returning(|| Ok(()));

        let dispatcher = Arc::new(InMemoryEventDispatcher::new());
        let queue = queue_with(vec![DeleteWorkItem::new(1, 26, "Building")]).await;
        let worker = DeleteWorker::new(
            3,
            WorkerConnection::Private(Box::new(session)),
            queue,
            call(),
            dispatcher.clone(),
            CancellationToken::new(),
        );

        let report = worker.run().await;
        assert_eq!(report.terminal_state(), WorkerState::Failed);
        assert_eq!(report.failed, 1);
        assert_eq!(report.committed, Some(false));

        let interrupts = dispatcher.interrupts().await;
        assert_eq!(interrupts.len(), 1);
        match &interrupts[0] {
            DeleteEvent::Interrupt { cause, global, .. } => {
                assert!(!global);
                assert!(cause.as_deref().unwrap_or_default().contains("deadlock detected"));
            }
            other => panic!("expected Interrupt, got {:?}", other),
        }
        // 専用接続の失敗は全体の中断にはならない
        assert!(!dispatcher.interrupt_signal().is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_worker_is_interrupted_and_rolls_back() {
        let mut session = MockSqlSession::new();
        session.expect_call_routine().never();
        session.expect_rollback().times(1).returning(|| Ok(()));

        let signal = CancellationToken::new();
        signal.cancel();
        let (_tx, rx) = mpsc::channel::<DeleteWorkItem>(1);
        let worker = DeleteWorker::new(
            0,
            WorkerConnection::Private(Box::new(session)),
            Arc::new(Mutex::new(rx)),
            call(),
            Arc::new(InMemoryEventDispatcher::new()),
            signal,
        );

        let report = worker.run().await;
        assert_eq!(report.terminal_state(), WorkerState::Interrupted);
        assert_eq!(report.attempted, 0);
    }

    #[tokio::test]
    async fn test_terminal_state_defaults_to_idle() {
        assert_eq!(WorkerReport::new(0).terminal_state(), WorkerState::Idle);
    }
}
