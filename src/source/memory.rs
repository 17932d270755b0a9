//! In-memory scan client

use super::ScanClient;
use crate::cursor::{PageFetcher, PagedResultCursor};
use crate::error::{Error, Result};
use crate::partition::{FilterExpr, ScanToken};
use crate::types::{JsonObject, JsonValue};
use async_trait::async_trait;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

/// [`ScanClient`] serving JSON rows held in memory
///
/// Clones share the same tables. Connection and page fetch failures can be
/// injected to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryTableClient {
    tables: Arc<RwLock<HashMap<String, Vec<JsonValue>>>>,
    fetch_failures: Arc<AtomicU32>,
    connect_failures: Arc<AtomicU32>,
}

impl MemoryTableClient {
    /// Create a client without tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a table
    #[must_use]
    pub fn with_table(self, name: impl Into<String>, rows: Vec<JsonValue>) -> Self {
        self.insert_table(name, rows);
        self
    }

    /// Add or replace a table through a shared handle
    pub fn insert_table(&self, name: impl Into<String>, rows: Vec<JsonValue>) {
        if let Ok(mut tables) = self.tables.write() {
            tables.insert(name.into(), rows);
        }
    }

    /// Make the next `count` page fetches fail
    pub fn fail_next_fetches(&self, count: u32) {
        self.fetch_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` connection attempts fail
    pub fn fail_next_connections(&self, count: u32) {
        self.connect_failures.store(count, Ordering::SeqCst);
    }

    fn matching_rows(&self, table: &str, filter: &FilterExpr) -> Result<Vec<JsonValue>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| Error::scan("table store poisoned"))?;
        let rows = tables
            .get(table)
            .ok_or_else(|| Error::scan(format!("Table '{table}' not found")))?;
        Ok(rows.iter().filter(|row| filter.matches(row)).cloned().collect())
    }
}

/// Consume one injected failure, if any is pending
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ScanClient for MemoryTableClient {
    type Connection = ();
    type Fetcher = MemoryPageFetcher;

    async fn open_connection(&self) -> Result<()> {
        if take_failure(&self.connect_failures) {
            return Err(Error::connection("injected connection failure"));
        }
        Ok(())
    }

    async fn count_rows(&self, _connection: &(), table: &str, filter: &FilterExpr) -> Result<u64> {
        Ok(self.matching_rows(table, filter)?.len() as u64)
    }

    async fn execute_scan(
        &self,
        _connection: &(),
        scan: &ScanToken,
    ) -> Result<PagedResultCursor<MemoryPageFetcher>> {
        let mut rows = self.matching_rows(&scan.table, &scan.filter)?;
        if let Some(column) = &scan.order_by {
            rows.sort_by(|a, b| compare_column(a, b, column));
        }

        let rows: VecDeque<JsonValue> = rows
            .into_iter()
            .skip(scan.offset as usize)
            .take(scan.limit as usize)
            .map(|row| project(row, &scan.projection))
            .collect();

        Ok(PagedResultCursor::new(MemoryPageFetcher {
            rows,
            page_size: scan.page_size.max(1),
            failures: Arc::clone(&self.fetch_failures),
        }))
    }
}

/// Page fetcher over rows selected by [`MemoryTableClient`]
#[derive(Debug)]
pub struct MemoryPageFetcher {
    rows: VecDeque<JsonValue>,
    page_size: usize,
    failures: Arc<AtomicU32>,
}

#[async_trait]
impl PageFetcher for MemoryPageFetcher {
    fn has_more_pages(&self) -> bool {
        !self.rows.is_empty()
    }

    async fn next_page(&mut self) -> Result<Vec<JsonValue>> {
        if take_failure(&self.failures) {
            return Err(Error::scan("injected page fetch failure"));
        }
        let n = self.page_size.min(self.rows.len());
        Ok(self.rows.drain(..n).collect())
    }
}

fn project(row: JsonValue, projection: &[String]) -> JsonValue {
    if projection.is_empty() {
        return row;
    }
    let JsonValue::Object(mut object) = row else {
        return row;
    };
    let projected: JsonObject = projection
        .iter()
        .filter_map(|column| object.remove(column).map(|v| (column.clone(), v)))
        .collect();
    JsonValue::Object(projected)
}

fn compare_column(a: &JsonValue, b: &JsonValue, column: &str) -> CmpOrdering {
    match (a.get(column), b.get(column)) {
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        _ => CmpOrdering::Equal,
    }
}
