use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DeleteError, Result};

/// TransactionScope はワーカーと接続の対応を表す。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionScope {
    /// ワーカーごとに専用の接続とトランザクションを持つ
    #[default]
    PerWorker,
    /// 全ワーカーが 1 本の接続と 1 つのトランザクションを共有する
    SharedGlobal,
}

impl fmt::Display for TransactionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerWorker => write!(f, "per_worker"),
            Self::SharedGlobal => write!(f, "shared_global"),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_queue_size() -> usize {
    1000
}

/// BulkDeleteConfig は一括削除ワーカープールの設定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDeleteConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default)]
    pub transaction_scope: TransactionScope,
    /// 呼び出すルーチン名。未指定ならルートテーブルのルーチン
    #[serde(default)]
    pub routine: Option<String>,
}

impl Default for BulkDeleteConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_size: default_queue_size(),
            transaction_scope: TransactionScope::default(),
            routine: None,
        }
    }
}

impl BulkDeleteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn transaction_scope(mut self, scope: TransactionScope) -> Self {
        self.transaction_scope = scope;
        self
    }

    pub fn routine(mut self, routine: impl Into<String>) -> Self {
        self.routine = Some(routine.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(DeleteError::Config("workers must be at least 1".to_string()));
        }
        if self.queue_size == 0 {
            return Err(DeleteError::Config("queue_size must be at least 1".to_string()));
        }
        Ok(())
    }
}
