//! Dirty record collectors
//!
//! Destinations for diverted rows. Collectors run inside the sink's writer
//! task, never on the read path.

use super::types::DirtyRecord;
use crate::config::CollectorConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::warn;

/// Destination for dirty records
#[async_trait]
pub trait DirtyCollector: Send {
    /// Write one dirty record
    async fn write(&mut self, record: &DirtyRecord) -> Result<()>;

    /// Flush buffered records
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Flush and release resources
    async fn close(&mut self) -> Result<()> {
        self.flush().await
    }
}

/// Build a collector from configuration
pub fn build_collector(config: &CollectorConfig) -> Box<dyn DirtyCollector> {
    match config {
        CollectorConfig::Log { print_rate } => Box::new(LogCollector::new(*print_rate)),
        CollectorConfig::JsonLines { path } => Box::new(JsonLinesCollector::new(path)),
    }
}

// ============================================================================
// Log Collector
// ============================================================================

/// Logs every `print_rate`-th dirty record
#[derive(Debug)]
pub struct LogCollector {
    print_rate: u64,
    seen: u64,
}

impl LogCollector {
    /// Create a log collector; a rate of 0 is treated as 1
    pub fn new(print_rate: u64) -> Self {
        Self {
            print_rate: print_rate.max(1),
            seen: 0,
        }
    }
}

#[async_trait]
impl DirtyCollector for LogCollector {
    async fn write(&mut self, record: &DirtyRecord) -> Result<()> {
        self.seen += 1;
        if self.seen % self.print_rate == 0 {
            warn!(
                seen = self.seen,
                error = %record.error,
                label = record.label.as_deref().unwrap_or(""),
                row = %record.raw_row,
                "Dirty record"
            );
        }
        Ok(())
    }
}

// ============================================================================
// JSON Lines Collector
// ============================================================================

/// Appends dirty records to a JSON lines file
///
/// The file is opened on the first write.
#[derive(Debug)]
pub struct JsonLinesCollector {
    path: PathBuf,
    writer: Option<BufWriter<tokio::fs::File>>,
}

impl JsonLinesCollector {
    /// Create a collector writing to `path`
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
        }
    }

    /// Target file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn writer(&mut self) -> Result<&mut BufWriter<tokio::fs::File>> {
        if self.writer.is_none() {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .map_err(|e| {
                    Error::dirty_collect(format!(
                        "Failed to open {}: {e}",
                        self.path.display()
                    ))
                })?;
            self.writer = Some(BufWriter::new(file));
        }
        self.writer
            .as_mut()
            .ok_or_else(|| Error::dirty_collect("writer not open"))
    }
}

#[async_trait]
impl DirtyCollector for JsonLinesCollector {
    async fn write(&mut self, record: &DirtyRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let writer = self.writer().await?;
        writer.write_all(&line).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush().await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.flush().await?;
        self.writer = None;
        Ok(())
    }
}

// ============================================================================
// Memory Collector
// ============================================================================

/// Keeps dirty records in a shared buffer
///
/// Clones share the same buffer, so a caller can keep one handle and give
/// another to the sink.
#[derive(Debug, Clone, Default)]
pub struct MemoryCollector {
    records: Arc<Mutex<Vec<DirtyRecord>>>,
    fail_writes: bool,
}

impl MemoryCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collector that rejects every write
    pub fn failing() -> Self {
        Self {
            records: Arc::default(),
            fail_writes: true,
        }
    }

    /// Records collected so far
    pub fn records(&self) -> Vec<DirtyRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Number of records collected
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Check if nothing was collected
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DirtyCollector for MemoryCollector {
    async fn write(&mut self, record: &DirtyRecord) -> Result<()> {
        if self.fail_writes {
            return Err(Error::dirty_collect("collector rejected record"));
        }
        self.records
            .lock()
            .map_err(|_| Error::dirty_collect("collector buffer poisoned"))?
            .push(record.clone());
        Ok(())
    }
}
