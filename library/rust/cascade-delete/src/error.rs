use thiserror::Error;

/// DeleteError はカスケード削除サブシステム全体のエラーを表す。
#[derive(Debug, Clone, Error)]
pub enum DeleteError {
    /// セッションが返したデータアクセスエラー
    #[error("database error: {0}")]
    Database(String),

    /// メタデータ取得の失敗。合成処理全体を中断する。
    #[error("schema introspection failed for table {table}: {message}")]
    SchemaIntrospection { table: String, message: String },

    #[error("routine name collision: {name} is generated for both {first} and {second}")]
    RoutineNameCollision {
        name: String,
        first: String,
        second: String,
    },

    #[error("installation failed at {statement}: {message}")]
    Installation { statement: String, message: String },

    #[error("delete of object {object_id} failed: {message}")]
    ItemDelete { object_id: i64, message: String },

    #[error("bulk delete was cancelled")]
    Cancelled,

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("unsupported database dialect: {0}")]
    UnsupportedDialect(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DeleteError>;

impl DeleteError {
    /// データアクセスエラーをメタデータ取得エラーに変換する。
    pub fn into_introspection(self, table: &str) -> Self {
        match self {
            Self::SchemaIntrospection { .. } | Self::InvalidIdentifier(_) => self,
            other => Self::SchemaIntrospection {
                table: table.to_string(),
                message: other.to_string(),
            },
        }
    }
}
