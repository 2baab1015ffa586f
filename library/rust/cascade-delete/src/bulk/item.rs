use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::DeleteError;

/// DeleteWorkItem は削除対象 1 件。ちょうど 1 つのワーカーが 1 度だけ処理する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteWorkItem {
    pub object_id: i64,
    pub objectclass_id: i32,
    #[serde(default)]
    pub objectclass_name: String,
}

impl DeleteWorkItem {
    pub fn new(object_id: i64, objectclass_id: i32, objectclass_name: impl Into<String>) -> Self {
        Self {
            object_id,
            objectclass_id,
            objectclass_name: objectclass_name.into(),
        }
    }
}

/// `object_id[,objectclass_id[,objectclass_name]]` 形式の 1 行を読み込む。
impl FromStr for DeleteWorkItem {
    type Err = DeleteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split(',').map(str::trim);
        let object_id = fields
            .next()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| DeleteError::Config(format!("missing object id in line: {s}")))?
            .parse::<i64>()
            .map_err(|e| DeleteError::Config(format!("invalid object id in line {s}: {e}")))?;
        let objectclass_id = match fields.next().filter(|f| !f.is_empty()) {
            Some(f) => f
                .parse::<i32>()
                .map_err(|e| DeleteError::Config(format!("invalid objectclass id in line {s}: {e}")))?,
            None => 0,
        };
        let objectclass_name = fields.next().unwrap_or_default().to_string();
        Ok(Self::new(object_id, objectclass_id, objectclass_name))
    }
}

/// DeleteOutcome はルーチン呼び出し 1 回の結果。「見つからない」はエラーではない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

impl DeleteOutcome {
    /// ルーチンが返した ID と対象 ID を比較して結果を判定する。
    pub fn from_returned(object_id: i64, returned: Option<i64>) -> Self {
        match returned {
            Some(id) if id == object_id => Self::Deleted,
            _ => Self::NotFound,
        }
    }
}
