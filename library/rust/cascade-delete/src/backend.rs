//! 方言ごとのバックエンド。起動時に一度だけ選択する。

use async_trait::async_trait;

use crate::dialect::DatabaseDialect;
use crate::emit::{DeleteScript, OracleEmitter, PostgisEmitter, ScriptEmitter, ScriptOptions};
use crate::error::Result;
use crate::install::{InstallOptions, InstallReport, ScriptInstaller};
use crate::schema::{AggregationInfoSource, SchemaIntrospector};
use crate::session::{RoutineCall, SqlSession};
use crate::synth::{DeleteRoutineSynthesizer, RoutineRegistry, SynthesisOptions};

/// DeleteBackend は合成・スクリプト生成・適用・呼び出し文生成の能力セット。
#[async_trait]
pub trait DeleteBackend: Send + Sync {
    fn dialect(&self) -> DatabaseDialect;

    async fn synthesize(
        &self,
        introspector: &dyn SchemaIntrospector,
        aggregation: &dyn AggregationInfoSource,
        schema: &str,
    ) -> Result<RoutineRegistry>;

    fn emit(&self, registry: &RoutineRegistry) -> Result<DeleteScript>;

    async fn install(
        &self,
        session: &mut dyn SqlSession,
        script: &DeleteScript,
        options: &InstallOptions,
    ) -> Result<InstallReport>;

    fn routine_call(&self, schema: &str, routine: &str) -> RoutineCall;
}

/// 方言に依存しない処理の共通部分。
struct BackendCore<E> {
    synthesis: SynthesisOptions,
    emitter: E,
}

impl<E: ScriptEmitter> BackendCore<E> {
    async fn synthesize(
        &self,
        introspector: &dyn SchemaIntrospector,
        aggregation: &dyn AggregationInfoSource,
        schema: &str,
    ) -> Result<RoutineRegistry> {
        DeleteRoutineSynthesizer::new(schema, self.synthesis.clone())
            .synthesize(introspector, aggregation, &self.emitter)
            .await
    }

    async fn install(
        &self,
        session: &mut dyn SqlSession,
        script: &DeleteScript,
        options: &InstallOptions,
    ) -> Result<InstallReport> {
        ScriptInstaller::new(options.clone()).install(session, script).await
    }
}

/// OracleBackend は削除ルーチンを 1 つのパッケージとして扱う。
pub struct OracleBackend {
    core: BackendCore<OracleEmitter>,
}

impl OracleBackend {
    pub fn new(synthesis: SynthesisOptions, script: ScriptOptions) -> Self {
        Self {
            core: BackendCore {
                synthesis,
                emitter: OracleEmitter::new(&script),
            },
        }
    }
}

#[async_trait]
impl DeleteBackend for OracleBackend {
    fn dialect(&self) -> DatabaseDialect {
        DatabaseDialect::Oracle
    }

    async fn synthesize(
        &self,
        introspector: &dyn SchemaIntrospector,
        aggregation: &dyn AggregationInfoSource,
        schema: &str,
    ) -> Result<RoutineRegistry> {
        self.core.synthesize(introspector, aggregation, schema).await
    }

    fn emit(&self, registry: &RoutineRegistry) -> Result<DeleteScript> {
        self.core.emitter.emit(registry)
    }

    async fn install(
        &self,
        session: &mut dyn SqlSession,
        script: &DeleteScript,
        options: &InstallOptions,
    ) -> Result<InstallReport> {
        self.core.install(session, script, options).await
    }

    fn routine_call(&self, schema: &str, routine: &str) -> RoutineCall {
        self.core.emitter.routine_call(schema, routine)
    }
}

/// PostgisBackend はルーチンごとに独立した関数を扱う。
pub struct PostgisBackend {
    core: BackendCore<PostgisEmitter>,
}

impl PostgisBackend {
    pub fn new(synthesis: SynthesisOptions) -> Self {
        Self {
            core: BackendCore {
                synthesis,
                emitter: PostgisEmitter::new(),
            },
        }
    }
}

#[async_trait]
impl DeleteBackend for PostgisBackend {
    fn dialect(&self) -> DatabaseDialect {
        DatabaseDialect::Postgis
    }

    async fn synthesize(
        &self,
        introspector: &dyn SchemaIntrospector,
        aggregation: &dyn AggregationInfoSource,
        schema: &str,
    ) -> Result<RoutineRegistry> {
        self.core.synthesize(introspector, aggregation, schema).await
    }

    fn emit(&self, registry: &RoutineRegistry) -> Result<DeleteScript> {
        self.core.emitter.emit(registry)
    }

    async fn install(
        &self,
        session: &mut dyn SqlSession,
        script: &DeleteScript,
        options: &InstallOptions,
    ) -> Result<InstallReport> {
        self.core.install(session, script, options).await
    }

    fn routine_call(&self, schema: &str, routine: &str) -> RoutineCall {
        self.core.emitter.routine_call(schema, routine)
    }
}

/// 方言に対応するバックエンドを生成する。
pub fn create_backend(
    dialect: DatabaseDialect,
    synthesis: SynthesisOptions,
    script: ScriptOptions,
) -> Box<dyn DeleteBackend> {
    match dialect {
        DatabaseDialect::Oracle => Box::new(OracleBackend::new(synthesis, script)),
        DatabaseDialect::Postgis => Box::new(PostgisBackend::new(synthesis)),
    }
}
