use std::str::FromStr;

use privlease_core::AppError;
use serde::{Deserialize, Serialize};

/// Schema-level permissions that may be temporarily elevated.
///
/// This is a closed enumeration: grants never carry free-form permission
/// statements, only values validated at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaPermission {
    /// Allows reading rows in the schema.
    Select,
    /// Allows inserting rows into the schema.
    Insert,
    /// Allows updating rows in the schema.
    Update,
    /// Allows deleting rows from the schema.
    Delete,
}

impl SchemaPermission {
    /// Returns a stable storage value for this permission.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Returns the SQL keyword used when applying this permission.
    #[must_use]
    pub fn as_sql_keyword(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    /// Returns all known permissions.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[SchemaPermission] = &[
            SchemaPermission::Select,
            SchemaPermission::Insert,
            SchemaPermission::Update,
            SchemaPermission::Delete,
        ];

        ALL
    }
}

impl FromStr for SchemaPermission {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "select" => Ok(Self::Select),
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            _ => Err(AppError::Validation(format!(
                "unknown permission value '{value}'"
            ))),
        }
    }
}
