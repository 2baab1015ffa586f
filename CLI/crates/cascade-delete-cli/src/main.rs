mod cli;
mod commands;
mod config;
mod logging;

use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use cli::{Cli, Commands};
use config::Config;

const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// --config、CONFIG_PATH、既定パスの順に設定ファイルを探す。
/// 明示されたファイルが読めない場合はエラー、既定パスがなければ既定値を使う。
fn load_config(explicit: Option<PathBuf>) -> anyhow::Result<Config> {
    let explicit = explicit.or_else(|| std::env::var("CONFIG_PATH").ok().map(PathBuf::from));
    match explicit {
        Some(path) => Config::load(&path.to_string_lossy()),
        None if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Config::load(DEFAULT_CONFIG_PATH)
        }
        None => Ok(Config::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(cli.config)?;
    logging::init_logger(&cfg.logging.level, &cfg.logging.format);

    info!(
        app_name = %cfg.app.name,
        version = %cfg.app.version,
        environment = %cfg.app.environment,
        dialect = %cfg.delete_script.dialect,
        "starting citydb-delete"
    );

    match cli.command {
        Commands::Generate {
            schema_file,
            output,
        } => commands::generate(&cfg, schema_file.as_deref(), output.as_deref()).await,
        Commands::Install { script } => commands::install(&cfg, script.as_deref()).await,
        Commands::Delete { ids, workers } => commands::delete(&cfg, &ids, workers).await,
    }
}
