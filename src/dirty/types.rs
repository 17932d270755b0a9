//! Dirty record types

use crate::types::JsonValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw source row that could not be converted, with its cause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirtyRecord {
    /// The offending raw row
    pub raw_row: JsonValue,
    /// Error that caused the row to be diverted
    pub error: String,
    /// Optional label (for example the failing column)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// When the row was collected
    pub collected_at: DateTime<Utc>,
}

impl DirtyRecord {
    /// Create a dirty record stamped with the current time
    pub fn new(raw_row: JsonValue, error: impl Into<String>, label: Option<String>) -> Self {
        Self {
            raw_row,
            error: error.into(),
            label,
            collected_at: Utc::now(),
        }
    }
}
