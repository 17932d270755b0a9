//! Engine types
//!
//! Lifecycle states, read outcomes and configuration for the reader engine.

use crate::config::{CollectorConfig, ReaderConfig, ReporterConfig};
use crate::dirty::DEFAULT_CHANNEL_CAPACITY;
use crate::metrics::{AccumulatorStore, InMemoryAccumulatorStore, WorkerId};
use crate::record::Record;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Position of a reader in its open/close lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Constructed, nothing opened
    Created,
    /// Job-level resources are open
    JobOpened,
    /// A partition is open, no read yet
    PartitionOpened,
    /// At least one read step ran
    Reading,
    /// The partition was closed
    PartitionClosed,
    /// Everything was released
    JobClosed,
}

impl LifecycleState {
    /// Whether a partition is currently open
    pub fn is_partition_open(self) -> bool {
        matches!(self, Self::PartitionOpened | Self::Reading)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "Created",
            Self::JobOpened => "JobOpened",
            Self::PartitionOpened => "PartitionOpened",
            Self::Reading => "Reading",
            Self::PartitionClosed => "PartitionClosed",
            Self::JobClosed => "JobClosed",
        };
        f.write_str(name)
    }
}

/// Result of one read step
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// A record was produced
    Record(Record),
    /// The row failed conversion and went to the dirty record sink
    Dirty,
    /// An empty page was fetched with more pending; step again
    Pending,
    /// No more rows in this partition
    EndOfPartition,
}

impl ReadOutcome {
    /// Check if this is a record
    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record(_))
    }

    /// Check if the partition is exhausted
    pub fn is_end(&self) -> bool {
        matches!(self, Self::EndOfPartition)
    }
}

/// What the host runtime provides to each reader
#[derive(Clone)]
pub struct RuntimeContext {
    /// Identity of this worker
    pub worker: WorkerId,
    /// Accumulator store shared by all workers of the job
    pub accumulators: Arc<dyn AccumulatorStore>,
}

impl RuntimeContext {
    /// Create a new runtime context
    pub fn new(worker: WorkerId, accumulators: Arc<dyn AccumulatorStore>) -> Self {
        Self {
            worker,
            accumulators,
        }
    }

    /// Context for a single local worker with a private in-memory store
    pub fn local() -> Self {
        Self::new(
            WorkerId::default(),
            Arc::new(InMemoryAccumulatorStore::new()),
        )
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}

/// Configuration for the reader engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bytes-per-second ceiling (0 or less disables throttling)
    pub speed_bytes: i64,
    /// Period of the accumulator push
    pub accumulator_interval: Duration,
    /// Dirty record channel capacity
    pub dirty_channel_capacity: usize,
    /// Label attached to dirty records
    pub dirty_label: Option<String>,
    /// Dirty record collector
    pub collector: CollectorConfig,
    /// External metric reporter
    pub reporter: Option<ReporterConfig>,
    /// Fail the job when the reporter fails
    pub fail_on_report_error: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            speed_bytes: 0,
            accumulator_interval: Duration::from_secs(2),
            dirty_channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            dirty_label: None,
            collector: CollectorConfig::default(),
            reporter: None,
            fail_on_report_error: false,
        }
    }
}

impl EngineConfig {
    /// Create a new engine config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the engine settings from a reader job config
    pub fn from_reader_config(config: &ReaderConfig) -> Self {
        Self {
            speed_bytes: config.speed_bytes,
            accumulator_interval: config.accumulator_interval(),
            dirty_channel_capacity: config.dirty.channel_capacity,
            dirty_label: config.dirty.label.clone(),
            collector: config.dirty.collector.clone(),
            reporter: config.metrics.reporter.clone(),
            fail_on_report_error: config.metrics.fail_on_report_error,
        }
    }

    /// Set the throughput ceiling
    #[must_use]
    pub fn with_speed_bytes(mut self, speed_bytes: i64) -> Self {
        self.speed_bytes = speed_bytes;
        self
    }

    /// Set the accumulator push period
    #[must_use]
    pub fn with_accumulator_interval(mut self, interval: Duration) -> Self {
        self.accumulator_interval = interval;
        self
    }

    /// Set the dirty record channel capacity
    #[must_use]
    pub fn with_dirty_channel_capacity(mut self, capacity: usize) -> Self {
        self.dirty_channel_capacity = capacity;
        self
    }

    /// Set the dirty record label
    #[must_use]
    pub fn with_dirty_label(mut self, label: impl Into<String>) -> Self {
        self.dirty_label = Some(label.into());
        self
    }

    /// Set the external reporter
    #[must_use]
    pub fn with_reporter(mut self, reporter: ReporterConfig) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Set whether reporter failures are fatal
    #[must_use]
    pub fn with_fail_on_report_error(mut self, fail: bool) -> Self {
        self.fail_on_report_error = fail;
        self
    }
}
