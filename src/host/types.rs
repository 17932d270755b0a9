//! Host runtime types

use crate::error::Result;
use crate::metrics::counters::{DIRTY_DATA_COUNT, NUM_READ};
use crate::record::Record;
use crate::types::MetricValues;
use serde::Serialize;

/// Receives the records produced by every partition
///
/// Called from several tasks at once, one per partition.
pub trait RecordHandler: Send + Sync {
    /// Handle one record of `partition`
    fn handle(&self, partition: u32, record: Record) -> Result<()>;
}

impl<F> RecordHandler for F
where
    F: Fn(u32, Record) -> Result<()> + Send + Sync,
{
    fn handle(&self, partition: u32, record: Record) -> Result<()> {
        self(partition, record)
    }
}

/// Outcome of one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionReport {
    /// Token index
    pub partition: u32,
    /// Attempts made, including the first
    pub attempts: u32,
    /// Records handed to the handler in the last attempt
    pub records: u64,
    /// Failure message, if the partition did not complete
    pub error: Option<String>,
}

impl PartitionReport {
    /// Check if the partition completed
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Tokens planned
    pub planned: usize,
    /// Partitions skipped because a previous run completed them
    pub skipped: usize,
    /// Per-partition outcomes, ordered by partition index
    pub partitions: Vec<PartitionReport>,
    /// Accumulator totals over all workers
    pub totals: MetricValues,
}

impl RunSummary {
    /// Check if every partition that ran completed
    pub fn is_success(&self) -> bool {
        self.partitions.iter().all(PartitionReport::is_success)
    }

    /// Partitions that failed
    pub fn failed(&self) -> Vec<&PartitionReport> {
        self.partitions.iter().filter(|p| !p.is_success()).collect()
    }

    /// Total records read, including those restored from checkpoints and
    /// those of partitions skipped as already completed
    pub fn num_read(&self) -> u64 {
        self.totals.get(NUM_READ).copied().unwrap_or_default()
    }

    /// Total dirty records
    pub fn dirty(&self) -> u64 {
        self.totals.get(DIRTY_DATA_COUNT).copied().unwrap_or_default()
    }
}
