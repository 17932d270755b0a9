//! Per-worker reader counters
//!
//! Single writer (the owning read loop), many readers (the accumulator
//! aggregator, the rate limiter and the host). All updates are atomic so
//! no locking is needed between them.

use crate::types::MetricValues;
use std::sync::atomic::{AtomicU64, Ordering};

/// Records read
pub const NUM_READ: &str = "num_read";
/// Bytes read
pub const BYTE_READ: &str = "byte_read";
/// Read duration in milliseconds
pub const READ_DURATION: &str = "read_duration";
/// Rows diverted to the dirty record sink
pub const DIRTY_DATA_COUNT: &str = "dirty_data_count";
/// Dirty rows that could not be forwarded to the collector
pub const DIRTY_DATA_COLLECT_FAILED_COUNT: &str = "dirty_data_collect_failed_count";

/// Names of every counter, in report order
pub const ALL_METRICS: [&str; 5] = [
    NUM_READ,
    BYTE_READ,
    READ_DURATION,
    DIRTY_DATA_COUNT,
    DIRTY_DATA_COLLECT_FAILED_COUNT,
];

/// Monotonic counters owned by one reader
#[derive(Debug, Default)]
pub struct ReaderCounters {
    num_read: AtomicU64,
    bytes_read: AtomicU64,
    read_duration_ms: AtomicU64,
    dirty_consumed: AtomicU64,
    dirty_failed: AtomicU64,
}

impl ReaderCounters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one successfully read record of `bytes` size
    pub fn add_record(&self, bytes: u64) {
        self.num_read.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Overwrite the cumulative read duration
    pub fn set_duration_ms(&self, ms: u64) {
        self.read_duration_ms.store(ms, Ordering::Relaxed);
    }

    /// Count one row handed to the dirty sink
    pub fn add_dirty(&self) {
        self.dirty_consumed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one dirty row the collector did not accept
    pub fn add_dirty_failed(&self) {
        self.dirty_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn num_read(&self) -> u64 {
        self.num_read.load(Ordering::Relaxed)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn read_duration_ms(&self) -> u64 {
        self.read_duration_ms.load(Ordering::Relaxed)
    }

    pub fn dirty_consumed(&self) -> u64 {
        self.dirty_consumed.load(Ordering::Relaxed)
    }

    pub fn dirty_failed(&self) -> u64 {
        self.dirty_failed.load(Ordering::Relaxed)
    }

    /// Current value of a counter by metric name
    pub fn get(&self, name: &str) -> Option<u64> {
        let counter = self.counter(name)?;
        Some(counter.load(Ordering::Relaxed))
    }

    /// Copy all counters into a name -> value map
    pub fn snapshot(&self) -> MetricValues {
        ALL_METRICS
            .iter()
            .filter_map(|name| self.get(name).map(|v| ((*name).to_string(), v)))
            .collect()
    }

    /// Add previously checkpointed values so counters stay monotonic
    /// across a restart. Unknown names are ignored.
    pub fn restore(&self, saved: &MetricValues) {
        for (name, value) in saved {
            if let Some(counter) = self.counter(name) {
                counter.fetch_add(*value, Ordering::Relaxed);
            }
        }
    }

    fn counter(&self, name: &str) -> Option<&AtomicU64> {
        match name {
            NUM_READ => Some(&self.num_read),
            BYTE_READ => Some(&self.bytes_read),
            READ_DURATION => Some(&self.read_duration_ms),
            DIRTY_DATA_COUNT => Some(&self.dirty_consumed),
            DIRTY_DATA_COLLECT_FAILED_COUNT => Some(&self.dirty_failed),
            _ => None,
        }
    }
}
