use serde::{Deserialize, Serialize};

use metrica_common::error::{MetricaError, MetricaResult};

/// One flat record: column name to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A destination table, qualified by database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub database: String,
    pub table: String,
}

impl TableRef {
    /// Build a table reference, rejecting names that would need quoting.
    pub fn new(database: &str, table: &str) -> MetricaResult<Self> {
        validate_identifier(database)?;
        validate_identifier(table)?;
        Ok(Self {
            database: database.to_string(),
            table: table.to_string(),
        })
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// Identifiers are spliced into SQL text, so only `[A-Za-z0-9_]` is allowed.
pub fn validate_identifier(name: &str) -> MetricaResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(MetricaError::Config(format!("invalid identifier: {name:?}")))
    }
}
