//! Partition types
//!
//! Defines partition tokens and the scan descriptions they carry.

use super::filter::FilterExpr;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Partition Token
// ============================================================================

/// What a partition token asks the reader to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TokenKind {
    /// Read the scan described by a source-specific payload
    Scan {
        #[serde(with = "crate::types::base64_bytes")]
        payload: Vec<u8>,
    },
    /// Nothing to read; produced when the scan matches no rows
    Empty,
    /// Planning failed; opening this token raises the planning error
    Error { message: String },
}

/// Opaque, serializable descriptor of one unit of work
///
/// A token is handed to exactly one reader and can be opened without
/// reference to the planner that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionToken {
    /// Position of the token in the planned list
    pub index: u32,
    #[serde(flatten)]
    pub kind: TokenKind,
}

impl PartitionToken {
    /// Create a scan token
    pub fn scan(index: u32, payload: Vec<u8>) -> Self {
        Self {
            index,
            kind: TokenKind::Scan { payload },
        }
    }

    /// Create an empty-scan token
    pub fn empty(index: u32) -> Self {
        Self {
            index,
            kind: TokenKind::Empty,
        }
    }

    /// Create a sentinel token carrying a planning failure
    pub fn error(index: u32, message: impl Into<String>) -> Self {
        Self {
            index,
            kind: TokenKind::Error {
                message: message.into(),
            },
        }
    }

    /// Same token at another index
    #[must_use]
    pub fn with_index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    /// Source payload of a scan token
    pub fn payload(&self) -> Option<&[u8]> {
        match &self.kind {
            TokenKind::Scan { payload } => Some(payload),
            _ => None,
        }
    }

    /// Check if this is an empty-scan token
    pub fn is_empty(&self) -> bool {
        matches!(self.kind, TokenKind::Empty)
    }

    /// Check if this is a planning-failure sentinel
    pub fn is_error(&self) -> bool {
        matches!(self.kind, TokenKind::Error { .. })
    }

    /// Fail with the deferred planning error if this is a sentinel token
    pub fn ensure_openable(&self) -> Result<()> {
        match &self.kind {
            TokenKind::Error { message } => Err(Error::planning(message.clone())),
            _ => Ok(()),
        }
    }

    /// Serialize for handing to a worker
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize a token produced by [`PartitionToken::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// ============================================================================
// Scan Request
// ============================================================================

/// Logical scan handed to a [`super::PartitionPlanner`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Table to scan
    pub table: String,
    /// Columns to read from the source
    pub columns: Vec<String>,
    /// Row filter
    #[serde(default)]
    pub filter: FilterExpr,
    /// Column giving the scan a stable order
    #[serde(default)]
    pub order_by: Option<String>,
    /// Requested number of partitions (a lower bound hint)
    pub min_partitions: u32,
    /// Rows fetched per page
    pub page_size: usize,
}

impl ScanRequest {
    /// Create a request for a whole table
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            filter: FilterExpr::all(),
            order_by: None,
            min_partitions: 1,
            page_size: 1024,
        }
    }

    /// Set the projected columns
    #[must_use]
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    /// Set the filter
    #[must_use]
    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = filter;
        self
    }

    /// Set the ordering column
    #[must_use]
    pub fn with_order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(column.into());
        self
    }

    /// Set the requested partition count
    #[must_use]
    pub fn with_min_partitions(mut self, partitions: u32) -> Self {
        self.min_partitions = partitions;
        self
    }

    /// Set the page size
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

// ============================================================================
// Scan Token
// ============================================================================

/// Source payload of a scan partition: one row range of an ordered scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanToken {
    pub table: String,
    pub projection: Vec<String>,
    #[serde(default)]
    pub filter: FilterExpr,
    #[serde(default)]
    pub order_by: Option<String>,
    /// First row of the range
    pub offset: u64,
    /// Number of rows in the range
    pub limit: u64,
    pub page_size: usize,
}

impl ScanToken {
    /// Describe rows `[offset, offset + limit)` of a request's scan
    pub fn for_range(request: &ScanRequest, offset: u64, limit: u64) -> Self {
        Self {
            table: request.table.clone(),
            projection: request.columns.clone(),
            filter: request.filter.clone(),
            order_by: request.order_by.clone(),
            offset,
            limit,
            page_size: request.page_size.max(1),
        }
    }

    /// The remaining range after `consumed` rows were read
    #[must_use]
    pub fn resumed_after(&self, consumed: u64) -> Self {
        let skip = consumed.min(self.limit);
        Self {
            offset: self.offset + skip,
            limit: self.limit - skip,
            ..self.clone()
        }
    }

    /// Encode as a partition token payload
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a partition token payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| Error::planning(format!("Malformed scan token: {e}")))
    }
}
