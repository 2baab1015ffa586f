//! 3D 都市データベース向けのカスケード削除ルーチン生成と一括削除。
//!
//! スキーマのカタログからテーブル間の関係をたどり、テーブルごとの削除ルーチンを
//! 方言別の SQL スクリプトとして生成する。生成したルーチンはデータベースに
//! インストールし、[`bulk::BulkDeleteWorkerPool`] から並列に呼び出せる。

pub mod backend;
pub mod bulk;
pub mod dialect;
pub mod emit;
pub mod error;
pub mod install;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod schema;
pub mod session;
pub mod synth;

pub use backend::{create_backend, DeleteBackend, OracleBackend, PostgisBackend};
pub use bulk::{
    BulkDeleteConfig, BulkDeleteOutcome, BulkDeleteReport, BulkDeleteWorkerPool, DeleteEvent,
    DeleteOutcome, DeleteWorkItem, EventDispatcher, InMemoryEventDispatcher,
    LoggingEventDispatcher, ObjectCounter, RunningPool, TransactionScope, WorkerReport,
    WorkerState,
};
pub use dialect::DatabaseDialect;
pub use emit::{
    DeleteScript, OracleEmitter, PostgisEmitter, RoutineRenderer, ScriptEmitter, ScriptOptions,
};
pub use error::{DeleteError, Result};
pub use install::{InstallFailure, InstallOptions, InstallReport, ScriptInstaller};
pub use memory::{InMemoryDatabase, InMemorySession};
#[cfg(feature = "postgres")]
pub use postgres::{PgConnectionProvider, PgSession};
pub use schema::{
    AggregationIndex, AggregationInfo, AggregationInfoSource, AggregationType,
    CatalogIntrospector, InMemorySchema, SchemaIntrospector, TableMetadata,
};
pub use session::{ConnectionProvider, RoutineCall, SqlRow, SqlSession, SqlValue};
pub use synth::{
    DeleteRoutine, DeleteRoutineSynthesizer, DeleteStep, RelationshipKind, RoutineRegistry,
    SynthesisOptions,
};
