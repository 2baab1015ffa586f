use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dialect::normalize_identifier;
use crate::error::{DeleteError, Result};
use crate::schema::classify::{AggregationInfo, AggregationInfoSource};
use crate::schema::introspect::SchemaIntrospector;
use crate::schema::model::{ManyToManyRef, ParentReference, ReferencingTable, SelfReference};

fn default_primary_key() -> Vec<String> {
    vec!["id".to_string()]
}

fn default_nullable() -> bool {
    true
}

/// ForeignKeyDef は単一列の外部キー定義。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    #[serde(default)]
    pub name: Option<String>,
    pub column: String,
    pub references: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

/// TableDef は宣言的スキーマ上のテーブル定義。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDef>,
}

impl TableDef {
    fn fk_name(&self, fk: &ForeignKeyDef) -> String {
        fk.name
            .clone()
            .unwrap_or_else(|| format!("{}_{}_fk", self.name, fk.column))
            .to_ascii_lowercase()
    }

    fn is_primary_key_only(&self, column: &str) -> bool {
        self.primary_key.len() == 1 && self.primary_key[0].eq_ignore_ascii_case(column)
    }
}

/// InMemorySchema は宣言的に記述したスキーマからメタデータを導出する実装。
/// オフラインでのスクリプト生成とテストに使用する。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemorySchema {
    #[serde(default)]
    pub tables: Vec<TableDef>,
    #[serde(default)]
    pub aggregations: Vec<AggregationInfo>,
    #[serde(skip)]
    failing_tables: Vec<String>,
}

impl InMemorySchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// 主キー `id` のテーブルを追加する。
    pub fn table(self, name: &str) -> Self {
        self.table_with_key(name, &["id"])
    }

    pub fn table_with_key(mut self, name: &str, primary_key: &[&str]) -> Self {
        let key: Vec<String> = primary_key.iter().map(|c| c.to_ascii_lowercase()).collect();
        match self.find_mut(name) {
            Some(table) => table.primary_key = key,
            None => self.tables.push(TableDef {
                name: name.to_ascii_lowercase(),
                primary_key: key,
                foreign_keys: Vec::new(),
            }),
        }
        self
    }

    /// 外部キーを追加する。テーブルが未定義なら主キー `id` で作成する。
    pub fn foreign_key(mut self, table: &str, column: &str, references: &str, nullable: bool) -> Self {
        if self.find_mut(table).is_none() {
            self = self.table(table);
        }
        if let Some(def) = self.find_mut(table) {
            def.foreign_keys.push(ForeignKeyDef {
                name: None,
                column: column.to_ascii_lowercase(),
                references: references.to_ascii_lowercase(),
                nullable,
            });
        }
        self
    }

    /// 集約情報を追加する。is_composite が true なら composition。
    pub fn aggregation(mut self, child: &str, parent: &str, is_composite: bool) -> Self {
        self.aggregations.push(AggregationInfo {
            child_table: child.to_ascii_lowercase(),
            parent_table: parent.to_ascii_lowercase(),
            is_composite,
        });
        self
    }

    /// 指定テーブルのメタデータ取得を失敗させる（テスト用）。
    pub fn fail_on(mut self, table: &str) -> Self {
        self.failing_tables.push(table.to_ascii_lowercase());
        self
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut TableDef> {
        self.tables.iter_mut().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    fn find(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    fn check(&self, table: &str) -> Result<String> {
        let table = normalize_identifier(table)?;
        if self.failing_tables.contains(&table) {
            return Err(DeleteError::Database(format!(
                "metadata query failed for table {table}"
            )));
        }
        Ok(table)
    }
}

#[async_trait]
impl SchemaIntrospector for InMemorySchema {
    async fn self_references(&self, table: &str, _schema: &str) -> Result<Vec<SelfReference>> {
        let table = self.check(table)?;
        let Some(def) = self.find(&table) else {
            return Ok(Vec::new());
        };
        Ok(def
            .foreign_keys
            .iter()
            .filter(|fk| fk.references.eq_ignore_ascii_case(&table))
            .map(|fk| SelfReference {
                column: fk.column.to_ascii_lowercase(),
                nullable: fk.nullable,
            })
            .collect())
    }

    async fn many_to_many(&self, table: &str, _schema: &str) -> Result<Vec<ManyToManyRef>> {
        let table = self.check(table)?;
        let mut refs = Vec::new();
        for junction in &self.tables {
            if junction.primary_key.len() != 2 || junction.name.eq_ignore_ascii_case(&table) {
                continue;
            }
            let in_key = |fk: &&ForeignKeyDef| {
                junction
                    .primary_key
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(&fk.column))
            };
            let key_fks: Vec<&ForeignKeyDef> = junction.foreign_keys.iter().filter(in_key).collect();
            if key_fks.len() != 2 {
                continue;
            }
            for (i, root_fk) in key_fks.iter().enumerate() {
                if !root_fk.references.eq_ignore_ascii_case(&table) {
                    continue;
                }
                let other = key_fks[1 - i];
                refs.push(ManyToManyRef {
                    root_table: table.clone(),
                    junction_table: junction.name.to_ascii_lowercase(),
                    junction_column: root_fk.column.to_ascii_lowercase(),
                    associated_table: other.references.to_ascii_lowercase(),
                    associated_column: other.column.to_ascii_lowercase(),
                    associated_fk_name: junction.fk_name(other),
                });
            }
        }
        Ok(refs)
    }

    async fn parent_reference(&self, table: &str, _schema: &str) -> Result<Option<ParentReference>> {
        let table = self.check(table)?;
        let Some(def) = self.find(&table) else {
            return Ok(None);
        };
        Ok(def
            .foreign_keys
            .iter()
            .find(|fk| def.is_primary_key_only(&fk.column) && !fk.references.eq_ignore_ascii_case(&table))
            .map(|fk| ParentReference {
                fk_name: def.fk_name(fk),
                parent_table: fk.references.to_ascii_lowercase(),
            }))
    }

    async fn referencing_tables(&self, table: &str, _schema: &str) -> Result<Vec<ReferencingTable>> {
        let table = self.check(table)?;
        let mut refs = Vec::new();
        for child in &self.tables {
            if child.name.eq_ignore_ascii_case(&table) {
                continue;
            }
            for fk in &child.foreign_keys {
                if fk.references.eq_ignore_ascii_case(&table) && !child.is_primary_key_only(&fk.column) {
                    refs.push(ReferencingTable {
                        table: child.name.to_ascii_lowercase(),
                        column: fk.column.to_ascii_lowercase(),
                        nullable: fk.nullable,
                    });
                }
            }
        }
        Ok(refs)
    }
}

#[async_trait]
impl AggregationInfoSource for InMemorySchema {
    async fn load_aggregation_info(&self) -> Result<Vec<AggregationInfo>> {
        Ok(self.aggregations.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn city_schema() -> InMemorySchema {
        InMemorySchema::new()
            .table("cityobject")
            .foreign_key("building", "cityobject_id", "cityobject", false)
            .foreign_key("building", "building_parent_id", "building", true)
            .table("address")
            .table_with_key("address_to_building", &["address_id", "building_id"])
            .foreign_key("address_to_building", "address_id", "address", false)
            .foreign_key("address_to_building", "building_id", "building", false)
            .foreign_key("bridge", "id", "cityobject", false)
    }

    #[tokio::test]
    async fn test_self_references() {
        let refs = city_schema().self_references("building", "citydb").await.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].column, "building_parent_id");
        assert!(refs[0].nullable);
    }

    #[tokio::test]
    async fn test_many_to_many_detects_junction() {
        let refs = city_schema().many_to_many("building", "citydb").await.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].junction_table, "address_to_building");
        assert_eq!(refs[0].junction_column, "building_id");
        assert_eq!(refs[0].associated_table, "address");
        assert_eq!(refs[0].associated_column, "address_id");
        assert_eq!(refs[0].associated_fk_name, "address_to_building_address_id_fk");
    }

    #[tokio::test]
    async fn test_primary_key_reference_is_parent_not_child() {
        let schema = city_schema();
        let parent = schema.parent_reference("bridge", "citydb").await.unwrap().unwrap();
        assert_eq!(parent.parent_table, "cityobject");

        let children = schema.referencing_tables("cityobject", "citydb").await.unwrap();
        let names: Vec<&str> = children.iter().map(|c| c.table.as_str()).collect();
        assert_eq!(names, vec!["building"]);
    }

    #[tokio::test]
    async fn test_describe_excludes_junction_from_referenced_by() {
        let meta = city_schema().describe("building", "citydb").await.unwrap();
        assert!(meta.referenced_by.is_empty());
        assert_eq!(meta.many_to_many.len(), 1);
        assert_eq!(meta.self_references.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_on_table() {
        let err = city_schema()
            .fail_on("building")
            .describe("building", "citydb")
            .await
            .unwrap_err();
        assert!(matches!(err, DeleteError::SchemaIntrospection { .. }));
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let yaml = r#"
tables:
  - name: cityobject
  - name: building
    foreign_keys:
      - column: cityobject_id
        references: cityobject
        nullable: false
aggregations:
  - child_table: building
    parent_table: cityobject
    is_composite: true
"#;
        let schema: InMemorySchema = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(schema.tables.len(), 2);
        assert_eq!(schema.tables[0].primary_key, vec!["id".to_string()]);
        assert!(schema.tables[1].foreign_keys[0].name.is_none());
        assert!(schema.aggregations[0].is_composite);
    }
}
