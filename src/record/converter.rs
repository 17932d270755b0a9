//! Row converters
//!
//! Turn raw source rows into [`Record`]s.

use super::types::{ColumnSpec, FieldValue, Record};
use crate::error::{Error, Result};
use crate::types::JsonValue;

/// A row that could not be converted into a [`Record`]
///
/// Carries the offending raw row so the reader can hand it to the dirty
/// record sink.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct RowError {
    /// The raw source row
    pub raw_row: JsonValue,
    /// Column that failed, if the failure is column-specific
    pub column: Option<String>,
    /// Human-readable failure description
    pub message: String,
}

impl RowError {
    /// Create a row error not tied to a column
    pub fn new(raw_row: JsonValue, message: impl Into<String>) -> Self {
        Self {
            raw_row,
            column: None,
            message: message.into(),
        }
    }

    /// Create a row error for a specific column
    pub fn for_column(
        raw_row: JsonValue,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let column = column.into();
        Self {
            raw_row,
            message: format!("column '{column}': {}", message.into()),
            column: Some(column),
        }
    }
}

/// Converts raw source rows into typed records
pub trait RowConverter: Send + Sync {
    /// Convert one raw row
    fn convert(&self, row: &JsonValue) -> std::result::Result<Record, RowError>;
}

/// Converter for JSON-object rows keyed by column name
#[derive(Debug, Clone)]
pub struct JsonRowConverter {
    columns: Vec<ColumnSpec>,
    /// Pre-parsed constant per column position
    constants: Vec<Option<FieldValue>>,
}

impl JsonRowConverter {
    /// Create a converter, parsing constant overrides up front
    pub fn new(columns: Vec<ColumnSpec>) -> Result<Self> {
        let constants = columns
            .iter()
            .map(|column| {
                column
                    .value
                    .as_deref()
                    .map(|value| {
                        FieldValue::parse(value, column.column_type).map_err(|message| {
                            Error::invalid_value(format!("columns.{}.value", column.name), message)
                        })
                    })
                    .transpose()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { columns, constants })
    }

    /// Configured columns
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Names of the columns read from the source (constants removed)
    pub fn source_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !c.is_constant())
            .map(|c| c.name.clone())
            .collect()
    }
}

impl RowConverter for JsonRowConverter {
    fn convert(&self, row: &JsonValue) -> std::result::Result<Record, RowError> {
        let Some(object) = row.as_object() else {
            return Err(RowError::new(row.clone(), "row is not an object"));
        };

        let mut fields = Vec::with_capacity(self.columns.len());
        for (column, constant) in self.columns.iter().zip(&self.constants) {
            if let Some(constant) = constant {
                fields.push(constant.clone());
                continue;
            }

            let Some(raw) = object.get(&column.name) else {
                return Err(RowError::for_column(
                    row.clone(),
                    &column.name,
                    "missing from source row",
                ));
            };

            let field = FieldValue::from_json(raw, column.column_type)
                .map_err(|message| RowError::for_column(row.clone(), &column.name, message))?;
            fields.push(field);
        }

        Ok(Record::new(fields))
    }
}
