//! 方言ごとの削除スクリプト生成。

pub mod oracle;
pub mod postgis;
pub mod script;

use serde::{Deserialize, Serialize};

use crate::dialect::DatabaseDialect;
use crate::error::{DeleteError, Result};
use crate::session::RoutineCall;
use crate::synth::{DeleteRoutine, RoutineRegistry};

pub use oracle::OracleEmitter;
pub use postgis::PostgisEmitter;
pub use script::{DeleteScript, PACKAGE_BODY_DELIMITER, STATEMENT_SEPARATOR};

fn default_package_name() -> String {
    "citydb_delete".to_string()
}

/// ScriptOptions はスクリプト生成の設定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptOptions {
    /// Oracle のパッケージ名
    #[serde(default = "default_package_name")]
    pub package_name: String,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            package_name: default_package_name(),
        }
    }
}

impl ScriptOptions {
    pub fn package_name(mut self, name: impl Into<String>) -> Self {
        self.package_name = name.into();
        self
    }
}

/// RoutineRenderer は 1 ルーチン分の宣言部と定義本体を方言の構文で描画する。
pub trait RoutineRenderer: Send + Sync {
    fn dialect(&self) -> DatabaseDialect;

    fn declaration(&self, routine: &DeleteRoutine) -> String;

    fn definition(&self, routine: &DeleteRoutine) -> String;
}

/// ScriptEmitter は登録簿全体からインストール可能なスクリプトを組み立てる。
pub trait ScriptEmitter: RoutineRenderer {
    fn emit(&self, registry: &RoutineRegistry) -> Result<DeleteScript>;

    /// インストール済みルーチンの呼び出し文を返す。
    fn routine_call(&self, schema: &str, routine: &str) -> RoutineCall;
}

/// 登録簿がスクリプト化できる状態か確認する。
pub(crate) fn ensure_emittable(registry: &RoutineRegistry) -> Result<()> {
    if registry.is_empty() {
        return Err(DeleteError::Config("routine registry is empty".to_string()));
    }
    if !registry.is_complete() {
        return Err(DeleteError::Config(
            "routine registry contains routines without a body".to_string(),
        ));
    }
    Ok(())
}

/// 本体の各行を字下げする。
pub(crate) fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indent_skips_blank_lines() {
        assert_eq!(indent("a\n\nb", 2), "  a\n\n  b");
    }

    #[test]
    fn test_empty_registry_is_not_emittable() {
        let err = ensure_emittable(&RoutineRegistry::new()).unwrap_err();
        assert!(matches!(err, DeleteError::Config(_)));
    }

    #[test]
    fn test_pending_registry_is_not_emittable() {
        let mut registry = RoutineRegistry::new();
        registry.reserve("cityobject", "del_cityobject");
        assert!(ensure_emittable(&registry).is_err());
    }
}
