//! DuckDB scan client
//!
//! Serves partition scans from a DuckDB database (file or in-memory).
//! Every reader gets its own connection cloned from the root database;
//! queries run on the blocking thread pool.

use crate::cursor::{PageFetcher, PagedResultCursor};
use crate::error::{Error, Result};
use crate::partition::{quote_identifier, FilterExpr, ScanToken};
use crate::source::ScanClient;
use crate::types::{JsonObject, JsonValue};
use async_trait::async_trait;
use duckdb::types::{TimeUnit, Value};
use duckdb::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A DuckDB connection shared with the blocking pool
pub type SharedConnection = Arc<Mutex<Connection>>;

/// [`ScanClient`] over a DuckDB database
#[derive(Clone)]
pub struct DuckDbClient {
    /// Connection to the root database; readers get clones of it
    root: SharedConnection,
    /// Database location (for logging)
    location: String,
}

impl DuckDbClient {
    /// Open a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            Error::connection(format!("Failed to open DuckDB at {}: {e}", path.display()))
        })?;
        Ok(Self::from_connection(conn, path.display().to_string()))
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::connection(format!("Failed to create DuckDB connection: {e}")))?;
        Ok(Self::from_connection(conn, ":memory:".to_string()))
    }

    fn from_connection(conn: Connection, location: String) -> Self {
        Self {
            root: Arc::new(Mutex::new(conn)),
            location,
        }
    }

    /// Database location
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Run statements on the root connection (schema setup, seeding)
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = lock(&self.root)?;
        conn.execute_batch(sql)?;
        Ok(())
    }
}

impl std::fmt::Debug for DuckDbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbClient")
            .field("location", &self.location)
            .finish()
    }
}

#[async_trait]
impl ScanClient for DuckDbClient {
    type Connection = SharedConnection;
    type Fetcher = DuckDbPageFetcher;

    async fn open_connection(&self) -> Result<SharedConnection> {
        let conn = lock(&self.root)?
            .try_clone()
            .map_err(|e| Error::connection(format!("Failed to connect to {}: {e}", self.location)))?;
        Ok(Arc::new(Mutex::new(conn)))
    }

    async fn count_rows(
        &self,
        connection: &SharedConnection,
        table: &str,
        filter: &FilterExpr,
    ) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            quote_table(table),
            where_clause(filter)
        );
        tracing::debug!("Executing query: {}", sql);

        let conn = Arc::clone(connection);
        let count: i64 = run_blocking(move || {
            let conn = lock(&conn)?;
            Ok(conn.query_row(&sql, [], |row| row.get(0))?)
        })
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn execute_scan(
        &self,
        connection: &SharedConnection,
        scan: &ScanToken,
    ) -> Result<PagedResultCursor<DuckDbPageFetcher>> {
        let columns = if scan.projection.is_empty() {
            table_columns(connection, &scan.table).await?
        } else {
            scan.projection.clone()
        };

        let select_list = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let order_by = scan
            .order_by
            .as_deref()
            .map_or_else(|| "rowid".to_string(), quote_identifier);
        let base_query = format!(
            "SELECT {select_list} FROM {}{} ORDER BY {order_by}",
            quote_table(&scan.table),
            where_clause(&scan.filter)
        );

        Ok(PagedResultCursor::new(DuckDbPageFetcher {
            conn: Arc::clone(connection),
            base_query,
            columns,
            next_offset: scan.offset,
            remaining: scan.limit,
            page_size: scan.page_size.max(1) as u64,
        }))
    }
}

/// Fetches one `LIMIT`/`OFFSET` page per call
#[derive(Debug)]
pub struct DuckDbPageFetcher {
    conn: SharedConnection,
    base_query: String,
    columns: Vec<String>,
    next_offset: u64,
    remaining: u64,
    page_size: u64,
}

#[async_trait]
impl PageFetcher for DuckDbPageFetcher {
    fn has_more_pages(&self) -> bool {
        self.remaining > 0
    }

    async fn next_page(&mut self) -> Result<Vec<JsonValue>> {
        let limit = self.page_size.min(self.remaining);
        let sql = format!("{} LIMIT {limit} OFFSET {}", self.base_query, self.next_offset);
        tracing::debug!("Executing batch query: {}", sql);

        let conn = Arc::clone(&self.conn);
        let columns = self.columns.clone();
        let rows = run_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| {
                    let mut object = JsonObject::new();
                    for (i, name) in columns.iter().enumerate() {
                        let value: Value = row.get(i)?;
                        object.insert(name.clone(), duckdb_value_to_json(value));
                    }
                    Ok(JsonValue::Object(object))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(|e| match e {
            Error::Database(inner) => Error::scan(format!("Page fetch failed: {inner}")),
            other => other,
        })?;

        self.next_offset += limit;
        // A short page means the table shrank under the scan
        self.remaining = if (rows.len() as u64) < limit {
            0
        } else {
            self.remaining - limit
        };
        Ok(rows)
    }
}

async fn table_columns(connection: &SharedConnection, table: &str) -> Result<Vec<String>> {
    let (sql, params) = match table.rsplit_once('.') {
        Some((schema, name)) => (
            "SELECT column_name FROM information_schema.columns \
             WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position",
            vec![schema.to_string(), name.to_string()],
        ),
        None => (
            "SELECT column_name FROM information_schema.columns \
             WHERE table_name = ? ORDER BY ordinal_position",
            vec![table.to_string()],
        ),
    };
    let conn = Arc::clone(connection);
    let table = table.to_string();

    run_blocking(move || {
        let conn = lock(&conn)?;
        let mut stmt = conn.prepare(sql)?;
        let columns = stmt
            .query_map(duckdb::params_from_iter(params.iter()), |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        if columns.is_empty() {
            return Err(Error::scan(format!("Table '{table}' not found")));
        }
        Ok(columns)
    })
    .await
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::scan(format!("DuckDB task failed: {e}")))?
}

fn lock(conn: &SharedConnection) -> Result<std::sync::MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| Error::connection("DuckDB connection lock poisoned"))
}

fn where_clause(filter: &FilterExpr) -> String {
    filter
        .to_sql()
        .map(|sql| format!(" WHERE {sql}"))
        .unwrap_or_default()
}

/// Quote a possibly schema-qualified table name
fn quote_table(table: &str) -> String {
    table
        .split('.')
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(".")
}

/// Convert DuckDB Value to JSON Value
fn duckdb_value_to_json(value: Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(b),
        Value::TinyInt(i) => JsonValue::from(i),
        Value::SmallInt(i) => JsonValue::from(i),
        Value::Int(i) => JsonValue::from(i),
        Value::BigInt(i) => JsonValue::from(i),
        Value::HugeInt(i) => JsonValue::String(i.to_string()),
        Value::UTinyInt(i) => JsonValue::from(i),
        Value::USmallInt(i) => JsonValue::from(i),
        Value::UInt(i) => JsonValue::from(i),
        Value::UBigInt(i) => JsonValue::from(i),
        Value::Float(f) => {
            serde_json::Number::from_f64(f64::from(f)).map_or(JsonValue::Null, JsonValue::Number)
        }
        Value::Double(f) => serde_json::Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number),
        // Kept as text so no precision is lost
        Value::Decimal(d) => JsonValue::String(d.to_string()),
        Value::Text(s) => JsonValue::String(s),
        Value::Blob(b) => JsonValue::String(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            b,
        )),
        Value::Timestamp(unit, t) => {
            let micros = match unit {
                TimeUnit::Second => t.saturating_mul(1_000_000),
                TimeUnit::Millisecond => t.saturating_mul(1_000),
                TimeUnit::Microsecond => t,
                TimeUnit::Nanosecond => t / 1_000,
            };
            chrono::DateTime::from_timestamp_micros(micros)
                .map(|dt| JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()))
                .unwrap_or(JsonValue::from(micros))
        }
        Value::Date32(d) => {
            // Days since epoch (719163 is the number of days from 1 CE to 1970-01-01)
            chrono::NaiveDate::from_num_days_from_ce_opt(d + 719_163)
                .map(|date| JsonValue::String(date.format("%Y-%m-%d").to_string()))
                .unwrap_or(JsonValue::from(d))
        }
        other => JsonValue::String(format!("{other:?}")),
    }
}
