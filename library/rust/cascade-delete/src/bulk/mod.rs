//! 削除ルーチンを並列に呼び出す一括削除ワーカープール。

pub mod config;
pub mod counter;
pub mod event;
pub mod item;
pub mod pool;
pub mod worker;

pub use config::{BulkDeleteConfig, TransactionScope};
pub use counter::ObjectCounter;
pub use event::{DeleteEvent, EventDispatcher, InMemoryEventDispatcher, LoggingEventDispatcher};
pub use item::{DeleteOutcome, DeleteWorkItem};
pub use pool::{BulkDeleteOutcome, BulkDeleteReport, BulkDeleteWorkerPool, RunningPool};
pub use worker::{WorkerReport, WorkerState};
