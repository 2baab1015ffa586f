use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::dialect::DatabaseDialect;
use crate::error::{DeleteError, Result};

/// ハッシュ接尾辞の桁数
const HASH_SUFFIX_LEN: usize = 8;

/// ルーチン名の上限。方言の識別子長がこれより短ければそちらに従う。
pub const MAX_ROUTINE_NAME_LEN: usize = 30;

/// テーブル名から削除ルーチン名を決定的に生成する。
/// 上限を超える場合は切り詰め、テーブル名の SHA-256 を接尾辞として付ける。
pub fn routine_name(dialect: DatabaseDialect, prefix: &str, table: &str) -> String {
    let table = table.to_ascii_lowercase();
    let full = format!("{}{}", prefix.to_ascii_lowercase(), table);
    let limit = MAX_ROUTINE_NAME_LEN.min(dialect.max_identifier_length());
    if full.len() <= limit {
        return full;
    }

    let digest = hex::encode(Sha256::digest(table.as_bytes()));
    let keep = limit - HASH_SUFFIX_LEN - 1;
    let head: String = full.chars().take(keep).collect();
    format!("{}_{}", head, &digest[..HASH_SUFFIX_LEN])
}

/// RoutineNamer は 1 回の合成処理の中でルーチン名をキャッシュし、衝突を検出する。
#[derive(Debug)]
pub struct RoutineNamer {
    dialect: DatabaseDialect,
    prefix: String,
    by_table: HashMap<String, String>,
    by_name: HashMap<String, String>,
}

impl RoutineNamer {
    pub fn new(dialect: DatabaseDialect, prefix: impl Into<String>) -> Self {
        Self {
            dialect,
            prefix: prefix.into(),
            by_table: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// テーブルに対応するルーチン名を返す。同じテーブルには常に同じ名前を返す。
    pub fn name_for(&mut self, table: &str) -> Result<String> {
        let table = table.to_ascii_lowercase();
        if let Some(name) = self.by_table.get(&table) {
            return Ok(name.clone());
        }

        let name = routine_name(self.dialect, &self.prefix, &table);
        if let Some(owner) = self.by_name.get(&name) {
            return Err(DeleteError::RoutineNameCollision {
                name,
                first: owner.clone(),
                second: table,
            });
        }
        self.by_name.insert(name.clone(), table.clone());
        self.by_table.insert(table, name.clone());
        Ok(name)
    }
}
