use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DeleteError;

/// DatabaseDialect は対象データベースのバックエンド種別を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseDialect {
    Oracle,
    Postgis,
}

impl DatabaseDialect {
    /// 識別子の最大長を返す。
    pub fn max_identifier_length(self) -> usize {
        match self {
            Self::Oracle => 30,
            Self::Postgis => 63,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Oracle => "oracle",
            Self::Postgis => "postgis",
        }
    }
}

impl fmt::Display for DatabaseDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseDialect {
    type Err = DeleteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oracle" => Ok(Self::Oracle),
            "postgis" | "postgresql" | "postgres" => Ok(Self::Postgis),
            other => Err(DeleteError::UnsupportedDialect(other.to_string())),
        }
    }
}

/// 識別子が英数字とアンダースコアのみで構成されていることを検証する。
pub fn validate_identifier(name: &str) -> Result<(), DeleteError> {
    if name.is_empty() {
        return Err(DeleteError::InvalidIdentifier("identifier cannot be empty".to_string()));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DeleteError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// 識別子を小文字に正規化し、検証する。
pub fn normalize_identifier(name: &str) -> Result<String, DeleteError> {
    let normalized = name.trim().to_ascii_lowercase();
    validate_identifier(&normalized)?;
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dialect_tags() {
        assert_eq!("oracle".parse::<DatabaseDialect>().unwrap(), DatabaseDialect::Oracle);
        assert_eq!("POSTGIS".parse::<DatabaseDialect>().unwrap(), DatabaseDialect::Postgis);
        assert_eq!("postgresql".parse::<DatabaseDialect>().unwrap(), DatabaseDialect::Postgis);
    }

    #[test]
    fn test_parse_unknown_dialect() {
        let err = "mysql".parse::<DatabaseDialect>().unwrap_err();
        assert!(matches!(err, DeleteError::UnsupportedDialect(ref d) if d == "mysql"));
    }

    #[test]
    fn test_identifier_limits() {
        assert_eq!(DatabaseDialect::Oracle.max_identifier_length(), 30);
        assert_eq!(DatabaseDialect::Postgis.max_identifier_length(), 63);
    }

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier(" CityObject ").unwrap(), "cityobject");
        assert!(normalize_identifier("city object").is_err());
        assert!(normalize_identifier("t\"; DROP TABLE x").is_err());
        assert!(normalize_identifier("").is_err());
    }
}
