use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::dialect::DatabaseDialect;
use crate::emit::DeleteScript;
use crate::error::{DeleteError, Result};
use crate::session::SqlSession;

const SAVEPOINT: &str = "delete_script_install";
const LABEL_MAX_LEN: usize = 80;

/// InstallOptions はスクリプト適用時の設定。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallOptions {
    /// PostGIS で失敗した関数を記録して残りの適用を続けるか
    #[serde(default)]
    pub continue_on_error: bool,
}

impl InstallOptions {
    pub fn continue_on_error(mut self, value: bool) -> Self {
        self.continue_on_error = value;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallFailure {
    pub statement: String,
    pub message: String,
}

/// InstallReport はスクリプト適用の結果。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub dialect: Option<DatabaseDialect>,
    pub installed: Vec<String>,
    pub failed: Vec<InstallFailure>,
    pub duration_ms: u64,
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// 文の先頭行をログ・エラー用のラベルにする。
pub fn statement_label(sql: &str) -> String {
    let line = sql
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    if line.chars().count() > LABEL_MAX_LEN {
        let head: String = line.chars().take(LABEL_MAX_LEN).collect();
        format!("{head}...")
    } else {
        line.to_string()
    }
}

/// パッケージヘッダーの先頭行からパッケージ名を取り出す。
fn package_name(header: &str) -> Option<String> {
    let mut tokens = header.split_whitespace();
    tokens.find(|t| t.eq_ignore_ascii_case("PACKAGE"))?;
    tokens
        .next()
        .map(|name| name.trim_end_matches(';').to_string())
}

fn installation_error(sql: &str, err: &DeleteError) -> DeleteError {
    DeleteError::Installation {
        statement: statement_label(sql),
        message: err.to_string(),
    }
}

/// ScriptInstaller は生成済みスクリプトを呼び出し側のセッション上で実行する。
/// コミットは呼び出し側が行う。
#[derive(Debug, Clone, Default)]
pub struct ScriptInstaller {
    options: InstallOptions,
}

impl ScriptInstaller {
    pub fn new(options: InstallOptions) -> Self {
        Self { options }
    }

    pub async fn install(
        &self,
        session: &mut dyn SqlSession,
        script: &DeleteScript,
    ) -> Result<InstallReport> {
        let start = Instant::now();
        let mut report = InstallReport {
            dialect: Some(script.dialect),
            ..Default::default()
        };

        for statement in &script.statements {
            match script.dialect {
                DatabaseDialect::Oracle => {
                    self.install_oracle(session, statement, &mut report).await?;
                }
                DatabaseDialect::Postgis => {
                    self.install_postgis(session, statement, &mut report).await?;
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            dialect = %script.dialect,
            installed = report.installed.len(),
            failed = report.failed.len(),
            duration_ms = report.duration_ms,
            "delete script installed"
        );
        Ok(report)
    }

    /// ヘッダーと本体を別々の文として実行する。本体が失敗した場合は
    /// ヘッダーだけが残らないようパッケージを削除してからエラーを返す。
    async fn install_oracle(
        &self,
        session: &mut dyn SqlSession,
        statement: &str,
        report: &mut InstallReport,
    ) -> Result<()> {
        let Some((header, body)) = DeleteScript::split_package(statement) else {
            session
                .execute(statement)
                .await
                .map_err(|e| installation_error(statement, &e))?;
            report.installed.push(statement_label(statement));
            return Ok(());
        };

        if let Err(e) = session.execute(&header).await {
            error!(error = %e, "failed to create package header");
            return Err(installation_error(&header, &e));
        }

        if let Err(e) = session.execute(&body).await {
            error!(error = %e, "failed to create package body");
            if let Some(name) = package_name(&header) {
                if let Err(drop_err) = session.execute(&format!("DROP PACKAGE {name}")).await {
                    warn!(package = %name, error = %drop_err, "failed to drop incomplete package");
                }
            }
            return Err(installation_error(&body, &e));
        }

        report.installed.push(statement_label(&header));
        report.installed.push(statement_label(&body));
        Ok(())
    }

    /// 関数ごとにセーブポイントを張って実行する。
    async fn install_postgis(
        &self,
        session: &mut dyn SqlSession,
        statement: &str,
        report: &mut InstallReport,
    ) -> Result<()> {
        let label = statement_label(statement);
        session
            .execute(&format!("SAVEPOINT {SAVEPOINT}"))
            .await
            .map_err(|e| installation_error(statement, &e))?;

        match session.execute(statement).await {
            Ok(_) => {
                session
                    .execute(&format!("RELEASE SAVEPOINT {SAVEPOINT}"))
                    .await
                    .map_err(|e| installation_error(statement, &e))?;
                report.installed.push(label);
                Ok(())
            }
            Err(e) if self.options.continue_on_error => {
                warn!(statement = %label, error = %e, "function installation failed, continuing");
                session
                    .execute(&format!("ROLLBACK TO SAVEPOINT {SAVEPOINT}"))
                    .await
                    .map_err(|re| installation_error(statement, &re))?;
                report.failed.push(InstallFailure {
                    statement: label,
                    message: e.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                error!(statement = %label, error = %e, "function installation failed");
                Err(installation_error(statement, &e))
            }
        }
    }
}
