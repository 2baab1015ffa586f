use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ObjectCounter はオブジェクトクラス ID ごとの削除件数。
/// 実行中にリセットしない。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectCounter {
    counts: BTreeMap<i32, u64>,
}

impl ObjectCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, objectclass_id: i32) {
        *self.counts.entry(objectclass_id).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &ObjectCounter) {
        for (class_id, count) in &other.counts {
            *self.counts.entry(*class_id).or_insert(0) += count;
        }
    }

    pub fn get(&self, objectclass_id: i32) -> u64 {
        self.counts.get(&objectclass_id).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<i32, u64> {
        &self.counts
    }
}
