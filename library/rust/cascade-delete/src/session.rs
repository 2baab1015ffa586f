//! データベース接続の抽象化。
//!
//! コアはバックエンドに対して「どの方言か」「接続をくれ」の 2 点だけを要求する。
//! 個々の接続は [`SqlSession`] として 1 つのトランザクションを保持する。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dialect::DatabaseDialect;
use crate::error::{DeleteError, Result};

/// SqlValue はクエリのバインド値および結果列の値を表す。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Int(i64),
    Text(String),
    Bool(bool),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// SqlRow はクエリ結果の 1 行を列名付きで保持する。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlRow {
    columns: Vec<(String, SqlValue)>,
}

impl SqlRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// 列を追加する（ビルダーパターン）。列名は小文字で保持する。
    pub fn with(mut self, name: &str, value: impl Into<SqlValue>) -> Self {
        self.push(name, value.into());
        self
    }

    pub fn push(&mut self, name: &str, value: SqlValue) {
        self.columns.push((name.to_ascii_lowercase(), value));
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        let name = name.to_ascii_lowercase();
        self.columns.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn get_string(&self, name: &str) -> Result<String> {
        match self.get(name) {
            Some(SqlValue::Text(s)) => Ok(s.clone()),
            Some(SqlValue::Int(i)) => Ok(i.to_string()),
            other => Err(missing_column(name, other)),
        }
    }

    pub fn get_i64(&self, name: &str) -> Result<i64> {
        match self.get(name) {
            Some(SqlValue::Int(i)) => Ok(*i),
            Some(SqlValue::Text(s)) => s
                .trim()
                .parse()
                .map_err(|_| DeleteError::Database(format!("column {name} is not an integer: {s}"))),
            other => Err(missing_column(name, other)),
        }
    }

    /// 真偽値を取得する。Oracle の 'Y'/'N' や 0/1 も受け付ける。
    pub fn get_bool(&self, name: &str) -> Result<bool> {
        match self.get(name) {
            Some(SqlValue::Bool(b)) => Ok(*b),
            Some(SqlValue::Int(i)) => Ok(*i != 0),
            Some(SqlValue::Text(s)) => Ok(matches!(
                s.trim().to_ascii_uppercase().as_str(),
                "Y" | "YES" | "TRUE" | "T" | "1"
            )),
            other => Err(missing_column(name, other)),
        }
    }
}

fn missing_column(name: &str, value: Option<&SqlValue>) -> DeleteError {
    match value {
        None => DeleteError::Database(format!("column {name} not found in result row")),
        Some(v) => DeleteError::Database(format!("column {name} has unexpected value {v:?}")),
    }
}

/// RoutineCall はインストール済み削除ルーチンの呼び出し文を表す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineCall {
    /// 呼び出すルーチン名（スキーマ・パッケージ修飾なし）
    pub routine: String,
    /// 方言固有の呼び出し SQL
    pub sql: String,
}

/// SqlSession は 1 本の接続と、その上の 1 つのトランザクションを表す。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SqlSession: Send + Sync {
    /// DDL/DML を実行し、影響行数を返す。
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// 位置パラメータ付きの問い合わせを実行する。
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>>;

    /// 削除ルーチンを呼び出し、実際に削除された ID を返す。
    async fn call_routine(&mut self, call: &RoutineCall, object_id: i64) -> Result<Option<i64>>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

/// ConnectionProvider は接続の払い出しと方言情報を提供する。
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    fn dialect(&self) -> DatabaseDialect;

    fn default_schema(&self) -> &str;

    /// トランザクションを開始済みのセッションを払い出す。
    async fn acquire(&self) -> Result<Box<dyn SqlSession>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup_is_case_insensitive() {
        let row = SqlRow::new().with("TABLE_NAME", "BUILDING");
        assert_eq!(row.get_string("table_name").unwrap(), "BUILDING");
    }

    #[test]
    fn test_get_bool_accepts_oracle_flags() {
        let row = SqlRow::new()
            .with("a", "Y")
            .with("b", "N")
            .with("c", 1_i64)
            .with("d", SqlValue::Bool(false));
        assert!(row.get_bool("a").unwrap());
        assert!(!row.get_bool("b").unwrap());
        assert!(row.get_bool("c").unwrap());
        assert!(!row.get_bool("d").unwrap());
    }

    #[test]
    fn test_get_i64_parses_text() {
        let row = SqlRow::new().with("id", "42");
        assert_eq!(row.get_i64("id").unwrap(), 42);
    }

    #[test]
    fn test_missing_column_is_database_error() {
        let row = SqlRow::new();
        let err = row.get_string("missing").unwrap_err();
        assert!(matches!(err, DeleteError::Database(_)));
    }

    #[test]
    fn test_null_column_is_error() {
        let row = SqlRow::new().with("name", SqlValue::Null);
        assert!(row.get_string("name").is_err());
    }
}
