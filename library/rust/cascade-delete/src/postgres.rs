//! sqlx による PostgreSQL/PostGIS 接続。

use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Executor, Postgres, Row, Transaction, TypeInfo};
use tracing::info;

use crate::dialect::DatabaseDialect;
use crate::error::{DeleteError, Result};
use crate::session::{ConnectionProvider, RoutineCall, SqlRow, SqlSession, SqlValue};

fn db_error(e: sqlx::Error) -> DeleteError {
    DeleteError::Database(e.to_string())
}

/// PgSession は 1 本のトランザクションを保持する。
/// commit / rollback 後の操作はエラーになる。drop 時は未確定分がロールバックされる。
pub struct PgSession {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    pub async fn begin(pool: &PgPool) -> Result<Self> {
        let tx = pool.begin().await.map_err(db_error)?;
        Ok(Self { tx: Some(tx) })
    }

    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>> {
        self.tx
            .as_mut()
            .ok_or_else(|| DeleteError::Database("transaction is already finished".to_string()))
    }
}

fn convert_row(row: &PgRow) -> Result<SqlRow> {
    let mut out = SqlRow::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "BOOL" => row
                .try_get::<Option<bool>, _>(i)
                .map(|v| v.map(SqlValue::Bool)),
            "INT2" => row
                .try_get::<Option<i16>, _>(i)
                .map(|v| v.map(|n| SqlValue::Int(i64::from(n)))),
            "INT4" => row
                .try_get::<Option<i32>, _>(i)
                .map(|v| v.map(|n| SqlValue::Int(i64::from(n)))),
            "INT8" => row
                .try_get::<Option<i64>, _>(i)
                .map(|v| v.map(SqlValue::Int)),
            _ => row
                .try_get::<Option<String>, _>(i)
                .map(|v| v.map(SqlValue::Text)),
        }
        .map_err(db_error)?;
        out.push(column.name(), value.unwrap_or(SqlValue::Null));
    }
    Ok(out)
}

#[async_trait]
impl SqlSession for PgSession {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let conn: &mut PgConnection = self.tx()?;
        let result = conn
            .execute(sqlx::raw_sql(sql))
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected())
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        let tx = self.tx()?;
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                SqlValue::Null => query.bind(None::<String>),
                SqlValue::Int(v) => query.bind(*v),
                SqlValue::Text(v) => query.bind(v.clone()),
                SqlValue::Bool(v) => query.bind(*v),
            };
        }
        let rows = query.fetch_all(&mut **tx).await.map_err(db_error)?;
        rows.iter().map(convert_row).collect()
    }

    async fn call_routine(&mut self, call: &RoutineCall, object_id: i64) -> Result<Option<i64>> {
        let tx = self.tx()?;
        sqlx::query_scalar::<_, Option<i64>>(&call.sql)
            .bind(object_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(db_error)
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await.map_err(db_error)?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await.map_err(db_error)?;
        }
        Ok(())
    }
}

/// PgConnectionProvider は PgPool からトランザクション付きセッションを払い出す。
#[derive(Clone)]
pub struct PgConnectionProvider {
    pool: PgPool,
    schema: String,
}

impl PgConnectionProvider {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    pub async fn connect(url: &str, max_connections: u32, schema: impl Into<String>) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(db_error)?;
        let schema = schema.into();
        info!(schema = %schema, max_connections, "database pool created");
        Ok(Self::new(pool, schema))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ConnectionProvider for PgConnectionProvider {
    fn dialect(&self) -> DatabaseDialect {
        DatabaseDialect::Postgis
    }

    fn default_schema(&self) -> &str {
        &self.schema
    }

    async fn acquire(&self) -> Result<Box<dyn SqlSession>> {
        Ok(Box::new(PgSession::begin(&self.pool).await?))
    }
}
