use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schema::{AggregationType, ManyToManyRef, ParentReference, SelfReference};

/// RelationshipKind は親子間の辺の種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Composition,
    Aggregation,
    Association,
    SelfReference,
}

impl From<AggregationType> for RelationshipKind {
    fn from(value: AggregationType) -> Self {
        match value {
            AggregationType::Composition => Self::Composition,
            AggregationType::Aggregation => Self::Aggregation,
            AggregationType::NoAggComp => Self::Association,
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Composition => write!(f, "composition"),
            Self::Aggregation => write!(f, "aggregation"),
            Self::Association => write!(f, "association"),
            Self::SelfReference => write!(f, "self_reference"),
        }
    }
}

/// RelationshipEdge は親テーブルと子テーブルを結ぶ外部キー 1 本を表す。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub parent_table: String,
    pub child_table: String,
    pub columns: Vec<String>,
    pub kind: RelationshipKind,
    pub nullable: bool,
}

/// TableNode は合成処理中に構築される 1 テーブル分のノード。
/// ルーチンの完成後は変更されない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNode {
    pub table: String,
    pub is_root: bool,
    pub edges: Vec<RelationshipEdge>,
    pub self_references: Vec<SelfReference>,
    pub many_to_many: Vec<ManyToManyRef>,
    pub parent: Option<ParentReference>,
}

/// DeleteStep は削除ルーチン本体の論理的な 1 手順。
/// ルーチン本体はこの順序のとおりに描画される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum DeleteStep {
    /// NOT NULL の自己参照: 参照している行を自分自身のルーチンで再帰的に削除する
    DeleteSelfReferencing { column: String },
    /// NULL 許容の自己参照: 参照を NULL にする
    NullifySelfReference { column: String },
    /// 中間テーブルの行だけを削除する
    DeleteJunctionRows { junction_table: String, column: String },
    /// 子テーブルの行を子のルーチンで削除する
    DeleteChildren {
        table: String,
        column: String,
        routine: String,
    },
    /// 子テーブルからの参照を解除する
    UnlinkChildren { table: String, column: String },
    DeleteOwnRow,
    /// 自分の行を削除できた場合に上位テーブルの行を削除する
    DeleteParentRow { table: String, routine: String },
}

impl DeleteStep {
    /// 手順が触れるテーブル名。自身の行の削除では None。
    pub fn target_table(&self) -> Option<&str> {
        match self {
            Self::DeleteSelfReferencing { .. }
            | Self::NullifySelfReference { .. }
            | Self::DeleteOwnRow => None,
            Self::DeleteJunctionRows { junction_table, .. } => Some(junction_table),
            Self::DeleteChildren { table, .. }
            | Self::UnlinkChildren { table, .. }
            | Self::DeleteParentRow { table, .. } => Some(table),
        }
    }
}

/// DeleteRoutine は削除ルーチン記述子。
/// 宣言部と定義本体は方言ごとのレンダラーが合成時に一度だけ埋める。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRoutine {
    pub table: String,
    pub name: String,
    pub schema: String,
    /// 主キー列名
    pub id_column: String,
    pub node: TableNode,
    pub steps: Vec<DeleteStep>,
    pub declaration: String,
    pub definition: String,
}

impl DeleteRoutine {
    /// このルーチンが呼び出す他のルーチン名（自分自身を除く）。
    pub fn callees(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                DeleteStep::DeleteChildren { routine, .. }
                | DeleteStep::DeleteParentRow { routine, .. } => Some(routine.as_str()),
                _ => None,
            })
            .collect()
    }
}
