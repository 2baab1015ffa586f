use anyhow::{anyhow, bail, Context};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use citydb_cascade_delete::synth::routine_name;
use citydb_cascade_delete::{
    create_backend, BulkDeleteOutcome, BulkDeleteWorkerPool, CatalogIntrospector,
    ConnectionProvider, DatabaseDialect, DeleteBackend, DeleteEvent, DeleteScript,
    DeleteWorkItem, EventDispatcher, InMemorySchema, LoggingEventDispatcher, PgConnectionProvider,
};

use crate::config::Config;

/// 進捗ログを出力する間隔（処理件数）
const PROGRESS_REPORT_EVERY: u64 = 1000;

fn backend_for(cfg: &Config) -> Box<dyn DeleteBackend> {
    let script = &cfg.delete_script;
    create_backend(
        script.dialect,
        script.synthesis.clone(),
        script.script.clone(),
    )
}

/// PostGIS のみ接続できる。Oracle はオフライン生成だけを扱う。
async fn connect(cfg: &Config) -> anyhow::Result<PgConnectionProvider> {
    if cfg.delete_script.dialect != DatabaseDialect::Postgis {
        bail!(
            "dialect {} has no database driver in this build; use generate --schema-file",
            cfg.delete_script.dialect
        );
    }
    let url = cfg
        .database_url()
        .ok_or_else(|| anyhow!("no database configured (set database or DATABASE_URL)"))?;
    let configured = cfg.database.as_ref().map_or(10, |db| db.max_connections);
    let workers = u32::try_from(cfg.bulk_delete.workers).unwrap_or(u32::MAX);
    let max_connections = configured.max(workers.saturating_add(1));
    let provider = PgConnectionProvider::connect(&url, max_connections, cfg.schema()).await?;
    Ok(provider)
}

async fn script_from_catalogue(
    cfg: &Config,
    backend: &dyn DeleteBackend,
    provider: &PgConnectionProvider,
) -> anyhow::Result<DeleteScript> {
    let schema = cfg.schema();
    let session = provider.acquire().await?;
    let introspector = CatalogIntrospector::new(backend.dialect(), &schema, session);
    let registry = backend.synthesize(&introspector, &introspector, &schema).await;

    // カタログの読み取りだけなので確定しない
    let mut session = introspector.into_session();
    if let Err(e) = session.rollback().await {
        warn!(error = %e, "failed to close catalogue session");
    }

    let script = backend.emit(&registry?)?;
    Ok(script)
}

pub async fn generate(
    cfg: &Config,
    schema_file: Option<&Path>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let backend = backend_for(cfg);
    let script = match schema_file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read schema file {}", path.display()))?;
            let model: InMemorySchema = serde_yaml::from_str(&content)
                .with_context(|| format!("invalid schema file {}", path.display()))?;
            let registry = backend.synthesize(&model, &model, &cfg.schema()).await?;
            backend.emit(&registry)?
        }
        None => {
            let provider = connect(cfg).await?;
            script_from_catalogue(cfg, backend.as_ref(), &provider).await?
        }
    };

    let text = script.render();
    match output {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(
                path = %path.display(),
                routines = script.routines.len(),
                "delete script written"
            );
        }
        None => print!("{text}"),
    }
    Ok(())
}

pub async fn install(cfg: &Config, script_file: Option<&Path>) -> anyhow::Result<()> {
    let backend = backend_for(cfg);
    let provider = connect(cfg).await?;
    let script = match script_file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read script {}", path.display()))?;
            DeleteScript::parse(&content)?
        }
        None => script_from_catalogue(cfg, backend.as_ref(), &provider).await?,
    };
    if script.dialect != backend.dialect() {
        bail!(
            "script was generated for {} but the configured dialect is {}",
            script.dialect,
            backend.dialect()
        );
    }

    let mut session = provider.acquire().await?;
    let report = match backend
        .install(session.as_mut(), &script, &cfg.delete_script.install)
        .await
    {
        Ok(report) => report,
        Err(e) => {
            if let Err(re) = session.rollback().await {
                warn!(error = %re, "failed to roll back installation");
            }
            return Err(e.into());
        }
    };
    session.commit().await?;

    println!(
        "installed {} statement(s), {} failed, {} ms",
        report.installed.len(),
        report.failed.len(),
        report.duration_ms
    );
    for failure in &report.failed {
        println!("  failed: {} ({})", failure.statement, failure.message);
    }
    if !report.is_success() {
        bail!("{} function(s) could not be installed", report.failed.len());
    }
    Ok(())
}

/// 削除対象ファイルを読み込む。空行と `#` で始まる行は読み飛ばす。
pub fn read_items(path: &Path) -> anyhow::Result<Vec<DeleteWorkItem>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_items(&content)
}

fn parse_items(content: &str) -> anyhow::Result<Vec<DeleteWorkItem>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| {
            line.parse::<DeleteWorkItem>()
                .map_err(|e| anyhow!("line {}: {}", n + 1, e))
        })
        .collect()
}

pub async fn delete(cfg: &Config, ids: &Path, workers: Option<usize>) -> anyhow::Result<()> {
    let items = read_items(ids)?;
    let mut bulk = cfg.bulk_delete.clone();
    if let Some(workers) = workers {
        bulk = bulk.workers(workers);
    }

    let backend = backend_for(cfg);
    let provider = Arc::new(connect(cfg).await?);
    let routine = bulk.routine.clone().unwrap_or_else(|| {
        let options = &cfg.delete_script.synthesis;
        routine_name(backend.dialect(), &options.routine_prefix, &options.root_table)
    });
    let call = backend.routine_call(provider.default_schema(), &routine);
    info!(items = items.len(), routine = %routine, "starting bulk delete");

    let dispatcher = Arc::new(LoggingEventDispatcher::new(PROGRESS_REPORT_EVERY));
    let ctrl_c = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                dispatcher
                    .publish(DeleteEvent::Interrupt {
                        message: "interrupted by user".to_string(),
                        cause: None,
                        global: true,
                    })
                    .await;
            }
        })
    };

    let pool = BulkDeleteWorkerPool::new(provider, dispatcher, bulk, call);
    let report = pool.run(items).await;
    ctrl_c.abort();
    let report = report?;

    println!(
        "{}: attempted {}, deleted {}, not found {}, failed {} ({} ms)",
        report.outcome,
        report.attempted,
        report.deleted,
        report.not_found,
        report.failed,
        report.duration_ms
    );
    for (objectclass_id, count) in report.counter.as_map() {
        println!("  objectclass {objectclass_id}: {count}");
    }

    match report.outcome {
        BulkDeleteOutcome::Completed => Ok(()),
        BulkDeleteOutcome::Cancelled => bail!("bulk delete was cancelled, uncommitted deletes were rolled back"),
        BulkDeleteOutcome::Failed => bail!("bulk delete failed, see the log for the failing objects"),
    }
}
