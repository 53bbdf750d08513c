//! The scalar value type bound into `?` placeholders.
//!
//! Kept deliberately small: the compiler only needs to know enough about a
//! value to render a literal for tracing (`Sql::to_literal`) and to coerce an
//! incoming string into the target property's declared type. Dialect drivers
//! are free to convert a `Value` into their own wire representation.

use compact_str::CompactString;
use core::fmt;

use crate::error::{CompileError, Result};

/// A property's declared SQL-ish type, used to coerce operator-prefixed
/// string predicate values (see `compiler::operator`) into a typed `Value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    Text,
    Integer,
    Float,
    Bool,
    Uuid,
    DateTime,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PropertyType::Text => "Text",
            PropertyType::Integer => "Integer",
            PropertyType::Float => "Float",
            PropertyType::Bool => "Bool",
            PropertyType::Uuid => "Uuid",
            PropertyType::DateTime => "DateTime",
        };
        f.write_str(s)
    }
}

/// A bound scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(CompactString),
    /// Stored as text; dialect drivers decide the wire representation.
    Uuid(CompactString),
    /// Stored as text (ISO-8601); dialect drivers decide the wire
    /// representation.
    DateTime(CompactString),
}

impl Value {
    /// Coerces a raw predicate-value string to `target`'s declared type.
    /// `column` is the name of the column the value is being bound to —
    /// carried into `TypeCoercionError` so a failure names the predicate it
    /// came from.
    pub fn coerce(raw: &str, target: PropertyType, column: &str) -> Result<Value> {
        Ok(match target {
            PropertyType::Text => Value::Text(raw.into()),
            PropertyType::Integer => Value::Integer(raw.parse::<i64>().map_err(|_| {
                CompileError::TypeCoercionError {
                    column: column.into(),
                    target_type: target.to_string().into(),
                    value: raw.into(),
                }
            })?),
            PropertyType::Float => Value::Float(raw.parse::<f64>().map_err(|_| {
                CompileError::TypeCoercionError {
                    column: column.into(),
                    target_type: target.to_string().into(),
                    value: raw.into(),
                }
            })?),
            PropertyType::Bool => Value::Bool(raw.parse::<bool>().map_err(|_| {
                CompileError::TypeCoercionError {
                    column: column.into(),
                    target_type: target.to_string().into(),
                    value: raw.into(),
                }
            })?),
            PropertyType::Uuid => Value::Uuid(raw.into()),
            PropertyType::DateTime => Value::DateTime(raw.into()),
        })
    }

    /// Renders this value as a SQL literal, for `Sql::to_literal` tracing
    /// output only — never for statements that are actually executed.
    pub fn to_literal(&self) -> CompactString {
        match self {
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string().into(),
            Value::Integer(i) => i.to_string().into(),
            Value::Float(f) => f.to_string().into(),
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")).into(),
            Value::Uuid(s) => format!("'{}'", s).into(),
            Value::DateTime(s) => format!("'{}'", s).into(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
