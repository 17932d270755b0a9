//! Record types
//!
//! The common tabular record format produced by every source.

use crate::types::{JsonObject, JsonValue};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Column Type
// ============================================================================

/// Declared type of a configured column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    Decimal,
    Timestamp,
    String,
}

impl ColumnType {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float => "float",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::Timestamp => "timestamp",
            Self::String => "string",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(Self::Boolean),
            "int8" | "tinyint" | "byte" => Ok(Self::Int8),
            "int16" | "smallint" | "short" => Ok(Self::Int16),
            "int32" | "int" | "integer" => Ok(Self::Int32),
            "int64" | "bigint" | "long" => Ok(Self::Int64),
            "float" | "real" => Ok(Self::Float),
            "double" => Ok(Self::Double),
            "decimal" | "numeric" => Ok(Self::Decimal),
            "timestamp" | "datetime" | "unixtime_micros" => Ok(Self::Timestamp),
            "string" | "varchar" | "text" | "char" => Ok(Self::String),
            other => Err(format!("unsupported column type '{other}'")),
        }
    }
}

impl TryFrom<String> for ColumnType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColumnType> for String {
    fn from(value: ColumnType) -> Self {
        value.as_str().to_string()
    }
}

// ============================================================================
// Column Spec
// ============================================================================

/// A configured column: name, declared type and optional constant override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name in the source
    pub name: String,
    /// Declared type
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Constant value used instead of reading the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ColumnSpec {
    /// Create a column read from the source
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            value: None,
        }
    }

    /// Create a column with a constant value
    pub fn constant(
        name: impl Into<String>,
        column_type: ColumnType,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            column_type,
            value: Some(value.into()),
        }
    }

    /// Whether this column uses a constant instead of the source value
    pub fn is_constant(&self) -> bool {
        self.value.is_some()
    }
}

// ============================================================================
// Field Value
// ============================================================================

/// A single typed field of a [`Record`]
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Decimal(BigDecimal),
    Timestamp(DateTime<Utc>),
    String(String),
}

impl FieldValue {
    /// Convert a raw JSON value into a field of the given type
    pub fn from_json(value: &JsonValue, column_type: ColumnType) -> Result<Self, String> {
        if value.is_null() {
            return Ok(Self::Null);
        }

        let field = match column_type {
            ColumnType::Boolean => Self::Boolean(bool_from_json(value)?),
            ColumnType::Int8 => {
                let v = int_from_json(value)?;
                Self::Int8(i8::try_from(v).map_err(|_| format!("{v} out of range for int8"))?)
            }
            ColumnType::Int16 => {
                let v = int_from_json(value)?;
                Self::Int16(i16::try_from(v).map_err(|_| format!("{v} out of range for int16"))?)
            }
            ColumnType::Int32 => {
                let v = int_from_json(value)?;
                Self::Int32(i32::try_from(v).map_err(|_| format!("{v} out of range for int32"))?)
            }
            ColumnType::Int64 => Self::Int64(int_from_json(value)?),
            ColumnType::Float => Self::Float(float_from_json(value)? as f32),
            ColumnType::Double => Self::Double(float_from_json(value)?),
            ColumnType::Decimal => Self::Decimal(decimal_from_json(value)?),
            ColumnType::Timestamp => Self::Timestamp(timestamp_from_json(value)?),
            ColumnType::String => Self::String(match value {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            }),
        };

        Ok(field)
    }

    /// Parse a constant string into a field of the given type
    pub fn parse(value: &str, column_type: ColumnType) -> Result<Self, String> {
        Self::from_json(&JsonValue::String(value.to_string()), column_type)
    }

    /// Approximate in-memory size in bytes
    pub fn estimated_size(&self) -> usize {
        match self {
            Self::Null => 0,
            Self::Boolean(_) | Self::Int8(_) => 1,
            Self::Int16(_) => 2,
            Self::Int32(_) | Self::Float(_) => 4,
            Self::Int64(_) | Self::Double(_) | Self::Timestamp(_) => 8,
            Self::Decimal(_) => 16,
            Self::String(s) => s.len(),
        }
    }

    /// Check if this is a null field
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Render as a JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Boolean(b) => JsonValue::Bool(*b),
            Self::Int8(i) => JsonValue::from(*i),
            Self::Int16(i) => JsonValue::from(*i),
            Self::Int32(i) => JsonValue::from(*i),
            Self::Int64(i) => JsonValue::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(f64::from(*f))
                .map_or(JsonValue::Null, JsonValue::Number),
            Self::Double(f) => {
                serde_json::Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number)
            }
            Self::Decimal(d) => JsonValue::String(d.to_string()),
            Self::Timestamp(ts) => {
                JsonValue::String(ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string())
            }
            Self::String(s) => JsonValue::String(s.clone()),
        }
    }
}

fn bool_from_json(value: &JsonValue) -> Result<bool, String> {
    match value {
        JsonValue::Bool(b) => Ok(*b),
        JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(format!("'{s}' is not a boolean")),
        },
        other => Err(format!("{other} is not a boolean")),
    }
}

fn int_from_json(value: &JsonValue) -> Result<i64, String> {
    match value {
        JsonValue::Number(n) => n.as_i64().ok_or_else(|| format!("{n} is not an integer")),
        JsonValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("'{s}' is not an integer")),
        other => Err(format!("{other} is not an integer")),
    }
}

fn float_from_json(value: &JsonValue) -> Result<f64, String> {
    match value {
        JsonValue::Number(n) => n.as_f64().ok_or_else(|| format!("{n} is not a number")),
        JsonValue::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{s}' is not a number")),
        other => Err(format!("{other} is not a number")),
    }
}

fn decimal_from_json(value: &JsonValue) -> Result<BigDecimal, String> {
    let text = match value {
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.trim().to_string(),
        other => return Err(format!("{other} is not a decimal")),
    };
    BigDecimal::from_str(&text).map_err(|_| format!("'{text}' is not a decimal"))
}

fn timestamp_from_json(value: &JsonValue) -> Result<DateTime<Utc>, String> {
    match value {
        // Epoch microseconds
        JsonValue::Number(n) => {
            let micros = n
                .as_i64()
                .ok_or_else(|| format!("{n} is not a timestamp"))?;
            let secs = micros.div_euclid(1_000_000);
            let nanos = (micros.rem_euclid(1_000_000) * 1000) as u32;
            DateTime::from_timestamp(secs, nanos).ok_or_else(|| format!("{n} is out of range"))
        }
        JsonValue::String(s) => {
            let s = s.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Ok(ts.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Ok(naive.and_utc());
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                    return Ok(naive.and_utc());
                }
            }
            Err(format!("'{s}' is not a timestamp"))
        }
        other => Err(format!("{other} is not a timestamp")),
    }
}

// ============================================================================
// Record
// ============================================================================

/// An ordered sequence of typed fields matching the configured columns
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Vec<FieldValue>,
}

impl Record {
    /// Create a record from its fields
    pub fn new(fields: Vec<FieldValue>) -> Self {
        Self { fields }
    }

    /// All fields in column order
    pub fn fields(&self) -> &[FieldValue] {
        &self.fields
    }

    /// Field at a column position
    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.fields.get(index)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Consume the record, returning its fields
    pub fn into_fields(self) -> Vec<FieldValue> {
        self.fields
    }

    /// Approximate size in bytes, charged to the bytes-read counter
    pub fn estimated_size(&self) -> usize {
        self.fields.iter().map(FieldValue::estimated_size).sum()
    }

    /// Render as a JSON object keyed by column name
    pub fn to_json(&self, columns: &[ColumnSpec]) -> JsonValue {
        let object: JsonObject = columns
            .iter()
            .zip(&self.fields)
            .map(|(column, field)| (column.name.clone(), field.to_json()))
            .collect();
        JsonValue::Object(object)
    }
}
