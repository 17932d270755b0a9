//! Record module
//!
//! Typed records, column specifications and row conversion.
//!
//! # Overview
//!
//! Sources hand raw rows to the reader as JSON objects. A [`RowConverter`]
//! turns each raw row into a [`Record`] following the configured
//! [`ColumnSpec`] list. Columns with a constant `value` never read from the
//! source row. A row that cannot be converted yields a [`RowError`] that
//! carries the raw row so it can be routed to the dirty record sink.

mod converter;
mod types;

pub use converter::{JsonRowConverter, RowConverter, RowError};
pub use types::{ColumnSpec, ColumnType, FieldValue, Record};

#[cfg(test)]
mod tests;
