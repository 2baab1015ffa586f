//! メモリ内のデータベース。トランザクションの可視性だけを再現する。

use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::dialect::DatabaseDialect;
use crate::error::{DeleteError, Result};
use crate::session::{ConnectionProvider, RoutineCall, SqlRow, SqlSession, SqlValue};

#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicUsize,
    calls: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

/// 指定回数目のルーチン呼び出しを止めておく地点。
#[derive(Debug, Clone)]
struct CallPause {
    at_call: usize,
    reached: Arc<Notify>,
    resume: CancellationToken,
}

/// InMemoryDatabase は格納済みオブジェクト ID の集合を保持する。
/// セッションでの削除はコミットされるまで他から見えない。
#[derive(Debug, Clone)]
pub struct InMemoryDatabase {
    dialect: DatabaseDialect,
    schema: String,
    objects: Arc<Mutex<BTreeSet<i64>>>,
    executed: Arc<Mutex<Vec<String>>>,
    counters: Arc<Counters>,
    failing_ids: HashSet<i64>,
    failing_statements: Vec<String>,
    call_delay: Option<Duration>,
    pause: Option<CallPause>,
}

impl InMemoryDatabase {
    pub fn new(dialect: DatabaseDialect, schema: impl Into<String>) -> Self {
        Self {
            dialect,
            schema: schema.into(),
            objects: Arc::new(Mutex::new(BTreeSet::new())),
            executed: Arc::new(Mutex::new(Vec::new())),
            counters: Arc::new(Counters::default()),
            failing_ids: HashSet::new(),
            failing_statements: Vec::new(),
            call_delay: None,
            pause: None,
        }
    }

    /// 格納済みオブジェクトを設定する。
    pub fn with_objects(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.objects = Arc::new(Mutex::new(ids.into_iter().collect()));
        self
    }

    /// 指定 ID の削除ルーチン呼び出しを失敗させる。
    pub fn fail_on_id(mut self, id: i64) -> Self {
        self.failing_ids.insert(id);
        self
    }

    /// 指定文字列を含む文の実行を失敗させる。
    pub fn fail_on_statement(mut self, marker: impl Into<String>) -> Self {
        self.failing_statements.push(marker.into());
        self
    }

    /// ルーチン呼び出しごとの遅延。
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    /// `at_call` 回目のルーチン呼び出しで `reached` を通知し、
    /// `resume` がキャンセルされるまでその呼び出しを止める。
    pub fn pause_at_call(
        mut self,
        at_call: usize,
        reached: Arc<Notify>,
        resume: CancellationToken,
    ) -> Self {
        self.pause = Some(CallPause {
            at_call,
            reached,
            resume,
        });
        self
    }

    pub async fn contains(&self, id: i64) -> bool {
        self.objects.lock().await.contains(&id)
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn executed(&self) -> Vec<String> {
        self.executed.lock().await.clone()
    }

    pub fn acquired_count(&self) -> usize {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.counters.calls.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> usize {
        self.counters.commits.load(Ordering::SeqCst)
    }

    pub fn rollback_count(&self) -> usize {
        self.counters.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionProvider for InMemoryDatabase {
    fn dialect(&self) -> DatabaseDialect {
        self.dialect
    }

    fn default_schema(&self) -> &str {
        &self.schema
    }

    async fn acquire(&self) -> Result<Box<dyn SqlSession>> {
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemorySession {
            db: self.clone(),
            staged: BTreeSet::new(),
        }))
    }
}

/// InMemorySession は削除予定の ID をコミットまで保持する。
#[derive(Debug)]
pub struct InMemorySession {
    db: InMemoryDatabase,
    staged: BTreeSet<i64>,
}

impl InMemorySession {
    async fn record(&self, sql: &str) -> Result<()> {
        self.db.executed.lock().await.push(sql.to_string());
        match self
            .db
            .failing_statements
            .iter()
            .find(|marker| sql.contains(marker.as_str()))
        {
            Some(marker) => Err(DeleteError::Database(format!(
                "statement failed on {marker}"
            ))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SqlSession for InMemorySession {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.record(sql).await?;
        Ok(0)
    }

    async fn query(&mut self, sql: &str, _params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        self.record(sql).await?;
        Ok(Vec::new())
    }

    async fn call_routine(&mut self, call: &RoutineCall, object_id: i64) -> Result<Option<i64>> {
        let n = self.db.counters.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(pause) = self.db.pause.as_ref().filter(|p| p.at_call == n) {
            pause.reached.notify_one();
            pause.resume.cancelled().await;
        }
        if let Some(delay) = self.db.call_delay {
            tokio::time::sleep(delay).await;
        }
        if self.db.failing_ids.contains(&object_id) {
            return Err(DeleteError::Database(format!(
                "{} failed for object {object_id}",
                call.routine
            )));
        }
        let exists = self.db.objects.lock().await.contains(&object_id);
        if exists && self.staged.insert(object_id) {
            Ok(Some(object_id))
        } else {
            Ok(None)
        }
    }

    async fn commit(&mut self) -> Result<()> {
        let mut objects = self.db.objects.lock().await;
        for id in std::mem::take(&mut self.staged) {
            objects.remove(&id);
        }
        self.db.counters.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.staged.clear();
        self.db.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call() -> RoutineCall {
        RoutineCall {
            routine: "del_cityobject".to_string(),
            sql: "SELECT citydb.del_cityobject($1)".to_string(),
        }
    }

    #[tokio::test]
    async fn test_delete_is_visible_only_after_commit() {
        let db = InMemoryDatabase::new(DatabaseDialect::Postgis, "citydb").with_objects([1, 2]);
        let mut session = db.acquire().await.unwrap();

        assert_eq!(session.call_routine(&call(), 1).await.unwrap(), Some(1));
        assert!(db.contains(1).await);
        session.commit().await.unwrap();
        assert!(!db.contains(1).await);
        assert_eq!(db.object_count().await, 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_deletes() {
        let db = InMemoryDatabase::new(DatabaseDialect::Postgis, "citydb").with_objects([1]);
        let mut session = db.acquire().await.unwrap();
        session.call_routine(&call(), 1).await.unwrap();
        session.rollback().await.unwrap();
        assert!(db.contains(1).await);
        assert_eq!(db.rollback_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_and_repeated_ids_return_none() {
        let db = InMemoryDatabase::new(DatabaseDialect::Postgis, "citydb").with_objects([1]);
        let mut session = db.acquire().await.unwrap();
        assert_eq!(session.call_routine(&call(), 7).await.unwrap(), None);
        assert_eq!(session.call_routine(&call(), 1).await.unwrap(), Some(1));
        assert_eq!(session.call_routine(&call(), 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pause_holds_call_until_resumed() {
        let reached = Arc::new(Notify::new());
        let resume = CancellationToken::new();
        let db = InMemoryDatabase::new(DatabaseDialect::Postgis, "citydb")
            .with_objects([1, 2])
            .pause_at_call(2, reached.clone(), resume.clone());
        let mut session = db.acquire().await.unwrap();
        assert_eq!(session.call_routine(&call(), 1).await.unwrap(), Some(1));

        let paused = tokio::spawn(async move { session.call_routine(&call(), 2).await });
        reached.notified().await;
        assert!(!paused.is_finished());
        resume.cancel();
        assert_eq!(paused.await.unwrap().unwrap(), Some(2));
        assert_eq!(db.call_count(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let db = InMemoryDatabase::new(DatabaseDialect::Oracle, "citydb")
            .with_objects([1])
            .fail_on_id(1)
            .fail_on_statement("PACKAGE BODY");
        let mut session = db.acquire().await.unwrap();
        assert!(session.call_routine(&call(), 1).await.is_err());
        assert!(session.execute("CREATE PACKAGE x").await.is_ok());
        assert!(session.execute("CREATE PACKAGE BODY x").await.is_err());
        assert_eq!(db.executed().await.len(), 2);
    }
}
