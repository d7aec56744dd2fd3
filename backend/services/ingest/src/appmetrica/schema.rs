use chrono::NaiveDateTime;
use serde_json::Value;

use metrica_common::DATETIME_FORMAT;
use metrica_db::analytics::models::Row;

use super::category::{DataCategory, FieldKind};
use super::models::Record;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("schema violation: field {field} has invalid value {value:?}")]
pub struct SchemaViolation {
    pub field: String,
    pub value: String,
}

impl SchemaViolation {
    fn new(field: &str, value: &Value) -> Self {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self {
            field: field.to_string(),
            value,
        }
    }
}

/// Coerce a raw record into the category's destination row.
///
/// The row holds exactly the category's fields. Fields the response did
/// not carry become `null`, except booleans which become `0`.
pub fn coerce_record(category: DataCategory, record: &Record) -> Result<Row, SchemaViolation> {
    let mut row = Row::new();
    for &field in category.fields() {
        let value = coerce_value(category.field_kind(field), field, record.get(field))?;
        row.insert(field.to_string(), value);
    }
    Ok(row)
}

pub fn coerce_value(
    kind: FieldKind,
    field: &str,
    value: Option<&Value>,
) -> Result<Value, SchemaViolation> {
    match kind {
        FieldKind::Boolean => Ok(Value::from(coerce_bool(value))),
        FieldKind::Integer => coerce_integer(field, value),
        FieldKind::DateTime => coerce_datetime(field, value),
        FieldKind::String => Ok(coerce_string(value)),
    }
}

/// `"true"` becomes 1; anything else, absent included, becomes 0.
fn coerce_bool(value: Option<&Value>) -> u8 {
    match value {
        Some(Value::Bool(true)) => 1,
        Some(Value::String(s)) if s == "true" => 1,
        _ => 0,
    }
}

fn coerce_integer(field: &str, value: Option<&Value>) -> Result<Value, SchemaViolation> {
    let Some(value) = value else {
        return Ok(Value::Null);
    };

    match value {
        Value::Null => Ok(Value::Null),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
        Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Value::from)
                .or_else(|_| s.parse::<u64>().map(Value::from))
                .map_err(|_| SchemaViolation::new(field, value))
        }
        other => Err(SchemaViolation::new(field, other)),
    }
}

fn coerce_datetime(field: &str, value: Option<&Value>) -> Result<Value, SchemaViolation> {
    let Some(value) = value else {
        return Ok(Value::Null);
    };

    match value {
        Value::Null => Ok(Value::Null),
        Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
        Value::String(s) => parse_datetime(s)
            .map(|dt| Value::String(dt.format(DATETIME_FORMAT).to_string()))
            .ok_or_else(|| SchemaViolation::new(field, value)),
        other => Err(SchemaViolation::new(field, other)),
    }
}

fn coerce_string(value: Option<&Value>) -> Value {
    match value {
        None | Some(Value::Null) => Value::Null,
        Some(Value::String(s)) => Value::String(s.clone()),
        Some(other) => Value::String(other.to_string()),
    }
}

/// Parse the Logs API `YYYY-MM-DD HH:MM:SS` layout.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), DATETIME_FORMAT).ok()
}
