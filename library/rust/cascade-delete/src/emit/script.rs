use chrono::{DateTime, Utc};
use std::fmt;

use crate::dialect::DatabaseDialect;
use crate::error::{DeleteError, Result};

/// 文ブロックの区切り行
pub const STATEMENT_SEPARATOR: &str =
    "-- ----------------------------------------------------------------";

/// Oracle パッケージのヘッダーと本体の境界を示す区切り行
pub const PACKAGE_BODY_DELIMITER: &str = "--@@PACKAGE_BODY@@";

const GENERATED_AT_PREFIX: &str = "-- Generated at: ";
const DIALECT_PREFIX: &str = "-- Dialect: ";
const ROUTINES_HEADER: &str = "-- Routines:";
const ROUTINE_ENTRY_PREFIX: &str = "--   ";

/// DeleteScript は生成された削除スクリプト。
/// ヘッダーコメントと区切り行で分けられた文ブロックからなる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteScript {
    pub dialect: DatabaseDialect,
    pub generated_at: DateTime<Utc>,
    pub routines: Vec<String>,
    pub statements: Vec<String>,
}

impl DeleteScript {
    pub fn new(dialect: DatabaseDialect, routines: Vec<String>, statements: Vec<String>) -> Self {
        Self {
            dialect,
            generated_at: Utc::now(),
            routines,
            statements,
        }
    }

    pub fn with_generated_at(mut self, generated_at: DateTime<Utc>) -> Self {
        self.generated_at = generated_at;
        self
    }

    /// スクリプト全体をテキストとして描画する。
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("-- Delete script for the 3D city database\n");
        out.push_str(&format!("{GENERATED_AT_PREFIX}{}\n", self.generated_at.to_rfc3339()));
        out.push_str(&format!("{DIALECT_PREFIX}{}\n", self.dialect));
        out.push_str(ROUTINES_HEADER);
        out.push('\n');
        for routine in &self.routines {
            out.push_str(&format!("{ROUTINE_ENTRY_PREFIX}{routine}\n"));
        }
        for statement in &self.statements {
            out.push('\n');
            out.push_str(STATEMENT_SEPARATOR);
            out.push('\n');
            out.push_str(statement.trim());
            out.push('\n');
        }
        out
    }

    /// 描画済みのスクリプトを読み込む。
    pub fn parse(text: &str) -> Result<Self> {
        let mut dialect = None;
        let mut generated_at = None;
        let mut routines = Vec::new();
        let mut in_routines = false;

        for line in text.lines() {
            if line == STATEMENT_SEPARATOR {
                break;
            }
            if let Some(value) = line.strip_prefix(DIALECT_PREFIX) {
                dialect = Some(value.parse::<DatabaseDialect>()?);
            } else if let Some(value) = line.strip_prefix(GENERATED_AT_PREFIX) {
                let parsed = DateTime::parse_from_rfc3339(value.trim()).map_err(|e| {
                    DeleteError::Config(format!("invalid generation timestamp {value}: {e}"))
                })?;
                generated_at = Some(parsed.with_timezone(&Utc));
            } else if line == ROUTINES_HEADER {
                in_routines = true;
            } else if in_routines {
                match line.strip_prefix(ROUTINE_ENTRY_PREFIX) {
                    Some(name) => routines.push(name.trim().to_string()),
                    None => in_routines = false,
                }
            }
        }

        let dialect = dialect
            .ok_or_else(|| DeleteError::Config("script header has no dialect line".to_string()))?;
        Ok(Self {
            dialect,
            generated_at: generated_at.unwrap_or_else(Utc::now),
            routines,
            statements: Self::parse_statements(text),
        })
    }

    /// 区切り行でテキストを分割し、文ブロックを取り出す。
    /// 最初の区切り行より前はヘッダーとして読み飛ばす。
    pub fn parse_statements(text: &str) -> Vec<String> {
        let mut statements = Vec::new();
        let mut current: Option<Vec<&str>> = None;
        for line in text.lines() {
            if line.trim_end() == STATEMENT_SEPARATOR {
                if let Some(lines) = current.take() {
                    push_block(&mut statements, &lines);
                }
                current = Some(Vec::new());
            } else if let Some(lines) = current.as_mut() {
                lines.push(line);
            }
        }
        if let Some(lines) = current {
            push_block(&mut statements, &lines);
        }
        statements
    }

    /// パッケージ文をヘッダーと本体に分ける。区切りがなければ None。
    pub fn split_package(statement: &str) -> Option<(String, String)> {
        let mut header = Vec::new();
        let mut body = Vec::new();
        let mut found = false;
        for line in statement.lines() {
            if line.trim() == PACKAGE_BODY_DELIMITER {
                found = true;
            } else if found {
                body.push(line);
            } else {
                header.push(line);
            }
        }
        found.then(|| (header.join("\n").trim().to_string(), body.join("\n").trim().to_string()))
    }
}

fn push_block(statements: &mut Vec<String>, lines: &[&str]) {
    let block = lines.join("\n");
    let block = block.trim();
    if !block.is_empty() {
        statements.push(block.to_string());
    }
}

impl fmt::Display for DeleteScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script() -> DeleteScript {
        DeleteScript::new(
            DatabaseDialect::Postgis,
            vec!["del_cityobject".to_string(), "del_building".to_string()],
            vec![
                "CREATE FUNCTION a() ...;".to_string(),
                "CREATE FUNCTION b() ...;".to_string(),
            ],
        )
    }

    #[test]
    fn test_render_has_header_and_separators() {
        let text = script().render();
        assert!(text.contains("-- Generated at: "));
        assert!(text.contains("-- Dialect: postgis"));
        assert!(text.contains("-- Routines:\n--   del_cityobject\n--   del_building\n"));
        assert_eq!(text.matches(STATEMENT_SEPARATOR).count(), 2);
    }

    #[test]
    fn test_parse_recovers_header_and_blocks() {
        let original = script();
        let parsed = DeleteScript::parse(&original.render()).unwrap();
        assert_eq!(parsed.dialect, DatabaseDialect::Postgis);
        assert_eq!(parsed.routines, original.routines);
        assert_eq!(parsed.statements, original.statements);
        assert_eq!(parsed.generated_at, original.generated_at);
    }

    #[test]
    fn test_parse_statements_ignores_empty_blocks() {
        let text = format!("-- header\n{STATEMENT_SEPARATOR}\n\n{STATEMENT_SEPARATOR}\nSELECT 1;\n");
        assert_eq!(DeleteScript::parse_statements(&text), vec!["SELECT 1;".to_string()]);
    }

    #[test]
    fn test_parse_without_dialect_fails() {
        let err = DeleteScript::parse("-- nothing here\n").unwrap_err();
        assert!(matches!(err, DeleteError::Config(_)));
    }

    #[test]
    fn test_split_package() {
        let statement = format!("CREATE PACKAGE p AS END p;\n{PACKAGE_BODY_DELIMITER}\nCREATE PACKAGE BODY p AS END p;");
        let (header, body) = DeleteScript::split_package(&statement).unwrap();
        assert_eq!(header, "CREATE PACKAGE p AS END p;");
        assert_eq!(body, "CREATE PACKAGE BODY p AS END p;");
        assert!(DeleteScript::split_package("CREATE FUNCTION f();").is_none());
    }
}
