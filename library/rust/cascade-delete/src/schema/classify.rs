use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{DeleteError, Result};

/// AggregationType は親子関係の分類結果を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationType {
    /// 子は独立したライフサイクルを持たず、親と一緒に削除される
    Composition,
    /// 子は共有され得るため、参照の解除のみ行う
    Aggregation,
    /// 所有関係なし。削除は伝播しない
    NoAggComp,
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Composition => write!(f, "composition"),
            Self::Aggregation => write!(f, "aggregation"),
            Self::NoAggComp => write!(f, "no_agg_comp"),
        }
    }
}

/// AggregationInfo は集約情報インデックスの 1 エントリ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationInfo {
    pub child_table: String,
    pub parent_table: String,
    pub is_composite: bool,
}

/// AggregationInfoSource は集約情報を提供する外部コラボレータ。
/// 合成処理 1 回につき 1 度だけ問い合わせる。
#[async_trait]
pub trait AggregationInfoSource: Send + Sync {
    async fn load_aggregation_info(&self) -> Result<Vec<AggregationInfo>>;
}

/// AggregationIndex は (子テーブル, 親テーブル) をキーとする分類用インデックス。
#[derive(Debug, Clone, Default)]
pub struct AggregationIndex {
    composition: HashSet<(String, String)>,
    aggregation: HashSet<(String, String)>,
}

impl AggregationIndex {
    pub fn from_entries(entries: impl IntoIterator<Item = AggregationInfo>) -> Self {
        let mut index = Self::default();
        for entry in entries {
            let key = (
                entry.child_table.to_ascii_lowercase(),
                entry.parent_table.to_ascii_lowercase(),
            );
            if entry.is_composite {
                index.composition.insert(key);
            } else {
                index.aggregation.insert(key);
            }
        }
        index
    }

    /// 集約情報を一度だけ読み込み、インデックスを構築する。
    pub async fn load(source: &dyn AggregationInfoSource) -> Result<Self> {
        let entries = source
            .load_aggregation_info()
            .await
            .map_err(|e| match e {
                DeleteError::SchemaIntrospection { .. } => e,
                other => other.into_introspection("aggregation_info"),
            })?;
        Ok(Self::from_entries(entries))
    }

    /// 子テーブルと親テーブルの関係を分類する。
    /// 両方に該当する場合は composition を優先する。
    pub fn classify(&self, child_table: &str, parent_table: &str) -> AggregationType {
        let key = (child_table.to_ascii_lowercase(), parent_table.to_ascii_lowercase());
        if self.composition.contains(&key) {
            AggregationType::Composition
        } else if self.aggregation.contains(&key) {
            AggregationType::Aggregation
        } else {
            AggregationType::NoAggComp
        }
    }

    pub fn len(&self) -> usize {
        self.composition.len() + self.aggregation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
