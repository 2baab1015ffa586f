use serde::{Deserialize, Serialize};

/// SelfReference はテーブル自身を参照する外部キー列を表す。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfReference {
    pub column: String,
    pub nullable: bool,
}

/// ManyToManyRef は削除対象テーブルを「根」側とする中間テーブルを表す。
/// 削除時は中間テーブルの行のみを削除し、関連先の行は削除しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManyToManyRef {
    pub root_table: String,
    pub junction_table: String,
    /// 中間テーブルから根テーブルへの外部キー列
    pub junction_column: String,
    pub associated_table: String,
    /// 中間テーブルから関連先テーブルへの外部キー列
    pub associated_column: String,
    pub associated_fk_name: String,
}

/// ParentReference は主キー列そのものが上位テーブルを参照する外部キー（継承）を表す。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentReference {
    pub fk_name: String,
    pub parent_table: String,
}

/// ReferencingTable は対象テーブルを外部キーで参照しているテーブルを表す。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencingTable {
    pub table: String,
    pub column: String,
    pub nullable: bool,
}

/// TableMetadata は 1 テーブル分のメタデータ取得結果。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub table: String,
    pub self_references: Vec<SelfReference>,
    pub many_to_many: Vec<ManyToManyRef>,
    pub parent: Option<ParentReference>,
    pub referenced_by: Vec<ReferencingTable>,
}

impl TableMetadata {
    /// 自己参照と多対多の中間テーブルを referenced_by から取り除く。
    pub fn normalize(mut self) -> Self {
        let table = self.table.clone();
        let junctions: Vec<String> = self
            .many_to_many
            .iter()
            .map(|m| m.junction_table.clone())
            .collect();
        self.referenced_by
            .retain(|r| r.table != table && !junctions.contains(&r.table));
        self.referenced_by.sort_by(|a, b| (&a.table, &a.column).cmp(&(&b.table, &b.column)));
        self.referenced_by.dedup();
        self.self_references.sort_by(|a, b| a.column.cmp(&b.column));
        self.self_references.dedup();
        self.many_to_many
            .sort_by(|a, b| (&a.junction_table, &a.junction_column).cmp(&(&b.junction_table, &b.junction_column)));
        self.many_to_many.dedup();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn referencing(table: &str, column: &str) -> ReferencingTable {
        ReferencingTable {
            table: table.to_string(),
            column: column.to_string(),
            nullable: true,
        }
    }

    #[test]
    fn test_normalize_removes_junction_and_self() {
        let meta = TableMetadata {
            table: "building".to_string(),
            self_references: vec![],
            many_to_many: vec![ManyToManyRef {
                root_table: "building".to_string(),
                junction_table: "address_to_building".to_string(),
                junction_column: "building_id".to_string(),
                associated_table: "address".to_string(),
                associated_column: "address_id".to_string(),
                associated_fk_name: "address_to_building_fk1".to_string(),
            }],
            parent: None,
            referenced_by: vec![
                referencing("thematic_surface", "building_id"),
                referencing("address_to_building", "building_id"),
                referencing("building", "building_parent_id"),
            ],
        }
        .normalize();

        assert_eq!(meta.referenced_by, vec![referencing("thematic_surface", "building_id")]);
    }

    #[test]
    fn test_normalize_sorts_and_dedups() {
        let meta = TableMetadata {
            table: "t".to_string(),
            referenced_by: vec![referencing("b", "x"), referencing("a", "y"), referencing("b", "x")],
            ..Default::default()
        }
        .normalize();
        let names: Vec<&str> = meta.referenced_by.iter().map(|r| r.table.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
