use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::dialect::{normalize_identifier, DatabaseDialect};
use crate::error::Result;
use crate::schema::catalog_sql::{oracle, postgis};
use crate::schema::classify::{AggregationInfo, AggregationInfoSource};
use crate::schema::model::{
    ManyToManyRef, ParentReference, ReferencingTable, SelfReference, TableMetadata,
};
use crate::session::{SqlRow, SqlSession, SqlValue};

/// SchemaIntrospector はテーブル間の関係をデータベースのメタデータから取得する。
/// すべて読み取り専用で、失敗時に部分的な状態は保持しない。
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    /// 自己参照する外部キー列を返す。
    async fn self_references(&self, table: &str, schema: &str) -> Result<Vec<SelfReference>>;

    /// table を根とする多対多の中間テーブルを返す。
    async fn many_to_many(&self, table: &str, schema: &str) -> Result<Vec<ManyToManyRef>>;

    /// 主キーが上位テーブルを参照する外部キーを返す（ルートテーブルは None）。
    async fn parent_reference(&self, table: &str, schema: &str) -> Result<Option<ParentReference>>;

    /// table を参照しているテーブルを返す。主キーのみによる参照は含まない。
    async fn referencing_tables(&self, table: &str, schema: &str) -> Result<Vec<ReferencingTable>>;

    /// 4 種のメタデータをまとめて取得する。
    /// いずれかの失敗は SchemaIntrospection エラーとして返る。
    async fn describe(&self, table: &str, schema: &str) -> Result<TableMetadata> {
        let self_references = self
            .self_references(table, schema)
            .await
            .map_err(|e| e.into_introspection(table))?;
        let many_to_many = self
            .many_to_many(table, schema)
            .await
            .map_err(|e| e.into_introspection(table))?;
        let parent = self
            .parent_reference(table, schema)
            .await
            .map_err(|e| e.into_introspection(table))?;
        let referenced_by = self
            .referencing_tables(table, schema)
            .await
            .map_err(|e| e.into_introspection(table))?;

        Ok(TableMetadata {
            table: table.to_string(),
            self_references,
            many_to_many,
            parent,
            referenced_by,
        }
        .normalize())
    }
}

/// CatalogIntrospector は方言ごとのカタログビューに問い合わせる実装。
pub struct CatalogIntrospector {
    dialect: DatabaseDialect,
    schema: String,
    session: Mutex<Box<dyn SqlSession>>,
}

impl CatalogIntrospector {
    pub fn new(
        dialect: DatabaseDialect,
        schema: impl Into<String>,
        session: Box<dyn SqlSession>,
    ) -> Self {
        Self {
            dialect,
            schema: schema.into(),
            session: Mutex::new(session),
        }
    }

    /// 保持しているセッションを返す（インストールで同じ接続を使う場合）。
    pub fn into_session(self) -> Box<dyn SqlSession> {
        self.session.into_inner()
    }

    async fn fetch(&self, pg_sql: &str, ora_sql: &str, table: &str, schema: &str) -> Result<Vec<SqlRow>> {
        let table = normalize_identifier(table)?;
        let schema = normalize_identifier(schema)?;
        let (sql, params) = match self.dialect {
            DatabaseDialect::Postgis => (pg_sql, vec![SqlValue::Text(table), SqlValue::Text(schema)]),
            // Oracle のディクショナリは大文字で格納されている
            DatabaseDialect::Oracle => (
                ora_sql,
                vec![
                    SqlValue::Text(table.to_ascii_uppercase()),
                    SqlValue::Text(schema.to_ascii_uppercase()),
                ],
            ),
        };
        let mut session = self.session.lock().await;
        session.query(sql, &params).await
    }
}

#[async_trait]
impl SchemaIntrospector for CatalogIntrospector {
    async fn self_references(&self, table: &str, schema: &str) -> Result<Vec<SelfReference>> {
        let rows = self
            .fetch(postgis::SELF_REFERENCES, oracle::SELF_REFERENCES, table, schema)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(SelfReference {
                    column: normalize_identifier(&row.get_string("column_name")?)?,
                    nullable: row.get_bool("is_nullable")?,
                })
            })
            .collect()
    }

    async fn many_to_many(&self, table: &str, schema: &str) -> Result<Vec<ManyToManyRef>> {
        let rows = self
            .fetch(postgis::MANY_TO_MANY, oracle::MANY_TO_MANY, table, schema)
            .await?;
        let root_table = normalize_identifier(table)?;
        rows.iter()
            .map(|row| {
                Ok(ManyToManyRef {
                    root_table: root_table.clone(),
                    junction_table: normalize_identifier(&row.get_string("junction_table")?)?,
                    junction_column: normalize_identifier(&row.get_string("junction_column")?)?,
                    associated_table: normalize_identifier(&row.get_string("associated_table")?)?,
                    associated_column: normalize_identifier(&row.get_string("associated_column")?)?,
                    associated_fk_name: row.get_string("associated_fk_name")?.to_ascii_lowercase(),
                })
            })
            .collect()
    }

    async fn parent_reference(&self, table: &str, schema: &str) -> Result<Option<ParentReference>> {
        let rows = self
            .fetch(postgis::PARENT_REFERENCE, oracle::PARENT_REFERENCE, table, schema)
            .await?;
        if rows.len() > 1 {
            warn!(table = %table, count = rows.len(), "multiple structural parents found, using the first one");
        }
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        Ok(Some(ParentReference {
            fk_name: row.get_string("fk_name")?.to_ascii_lowercase(),
            parent_table: normalize_identifier(&row.get_string("parent_table")?)?,
        }))
    }

    async fn referencing_tables(&self, table: &str, schema: &str) -> Result<Vec<ReferencingTable>> {
        let rows = self
            .fetch(postgis::REFERENCING_TABLES, oracle::REFERENCING_TABLES, table, schema)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(ReferencingTable {
                    table: normalize_identifier(&row.get_string("table_name")?)?,
                    column: normalize_identifier(&row.get_string("column_name")?)?,
                    nullable: row.get_bool("is_nullable")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl AggregationInfoSource for CatalogIntrospector {
    async fn load_aggregation_info(&self) -> Result<Vec<AggregationInfo>> {
        let schema = normalize_identifier(&self.schema)?;
        let sql = match self.dialect {
            DatabaseDialect::Postgis => postgis::aggregation_info(&schema),
            DatabaseDialect::Oracle => oracle::aggregation_info(&schema),
        };
        let mut session = self.session.lock().await;
        let rows = session.query(&sql, &[]).await?;
        debug!(entries = rows.len(), "aggregation info loaded");
        rows.iter()
            .map(|row| {
                Ok(AggregationInfo {
                    child_table: normalize_identifier(&row.get_string("child_table")?)?,
                    parent_table: normalize_identifier(&row.get_string("parent_table")?)?,
                    is_composite: row.get_bool("is_composite")?,
                })
            })
            .collect()
    }
}
