//! Configuration types for reader jobs
//!
//! This module contains the configuration structures used to define a
//! reader job in YAML format.
//!
//! ```yaml
//! table: events
//! columns:
//!   - { name: id, type: int64 }
//!   - { name: payload, type: string }
//!   - { name: region, type: string, value: eu-west }
//! filter: "id >= 100"
//! order_by: id
//! parallelism: 4
//! speed_bytes: 1048576
//! dirty:
//!   collector: { type: json_lines, path: /tmp/dirty.jsonl }
//! metrics:
//!   reporter: { type: push_gateway, url: "http://localhost:9091" }
//! ```

use crate::error::{Error, Result, ResultExt};
use crate::partition::{FilterExpr, ScanRequest};
use crate::record::{ColumnSpec, JsonRowConverter};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Top-Level Reader Config
// ============================================================================

/// Complete reader job configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Table to scan
    pub table: String,

    /// Output columns, in record order
    pub columns: Vec<ColumnSpec>,

    /// Filter expression (`col op literal [AND ...]`)
    #[serde(default)]
    pub filter: Option<String>,

    /// Column giving the scan a stable order
    #[serde(default)]
    pub order_by: Option<String>,

    /// Rows fetched per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Minimum number of partitions to plan
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,

    /// Bytes-per-second ceiling per worker (0 or less disables throttling)
    #[serde(default)]
    pub speed_bytes: i64,

    /// Period of the accumulator push in milliseconds
    #[serde(default = "default_accumulator_interval")]
    pub accumulator_interval_ms: u64,

    /// Dirty record handling
    #[serde(default)]
    pub dirty: DirtyConfig,

    /// Metric reporting
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Local host runtime settings
    #[serde(default)]
    pub runner: RunnerConfig,
}

fn default_page_size() -> usize {
    1024
}

fn default_parallelism() -> u32 {
    1
}

fn default_accumulator_interval() -> u64 {
    2000
}

impl ReaderConfig {
    /// Create a config reading `columns` from `table` with defaults elsewhere
    pub fn new(table: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            table: table.into(),
            columns,
            filter: None,
            order_by: None,
            page_size: default_page_size(),
            parallelism: default_parallelism(),
            speed_bytes: 0,
            accumulator_interval_ms: default_accumulator_interval(),
            dirty: DirtyConfig::default(),
            metrics: MetricsConfig::default(),
            runner: RunnerConfig::default(),
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Set the filter expression
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Set the ordering column
    #[must_use]
    pub fn with_order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(column.into());
        self
    }

    /// Set the page size
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the minimum partition count
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Set the throughput ceiling
    #[must_use]
    pub fn with_speed_bytes(mut self, speed_bytes: i64) -> Self {
        self.speed_bytes = speed_bytes;
        self
    }

    /// Set the accumulator push period
    #[must_use]
    pub fn with_accumulator_interval_ms(mut self, interval_ms: u64) -> Self {
        self.accumulator_interval_ms = interval_ms;
        self
    }

    /// Set the dirty record handling
    #[must_use]
    pub fn with_dirty(mut self, dirty: DirtyConfig) -> Self {
        self.dirty = dirty;
        self
    }

    /// Set the metric reporting
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsConfig) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set the local runner settings
    #[must_use]
    pub fn with_runner(mut self, runner: RunnerConfig) -> Self {
        self.runner = runner;
        self
    }

    /// Check the configuration for values that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.table.trim().is_empty() {
            return Err(Error::invalid_value("table", "must not be empty"));
        }
        if self.columns.is_empty() {
            return Err(Error::invalid_value("columns", "at least one column is required"));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(Error::invalid_value(
                    "columns",
                    format!("duplicate column '{}'", column.name),
                ));
            }
        }
        // Constants must parse as their declared type
        JsonRowConverter::new(self.columns.clone())?;

        if self.page_size == 0 {
            return Err(Error::invalid_value("page_size", "must be positive"));
        }
        if self.parallelism == 0 {
            return Err(Error::invalid_value("parallelism", "must be positive"));
        }
        if self.runner.max_attempts == 0 {
            return Err(Error::invalid_value("runner.max_attempts", "must be positive"));
        }

        self.filter_expr()?;
        Ok(())
    }

    /// The parsed filter; no filter matches every row
    pub fn filter_expr(&self) -> Result<FilterExpr> {
        match self.filter.as_deref() {
            Some(filter) => FilterExpr::parse(filter),
            None => Ok(FilterExpr::all()),
        }
    }

    /// The scan described by this config
    ///
    /// The projection is left empty so the source can derive it from the
    /// non-constant columns.
    pub fn scan_request(&self) -> Result<ScanRequest> {
        let mut request = ScanRequest::new(self.table.clone())
            .with_filter(self.filter_expr()?)
            .with_min_partitions(self.parallelism)
            .with_page_size(self.page_size);
        if let Some(column) = &self.order_by {
            request = request.with_order_by(column.clone());
        }
        Ok(request)
    }

    /// Period of the accumulator push
    pub fn accumulator_interval(&self) -> Duration {
        Duration::from_millis(self.accumulator_interval_ms.max(1))
    }
}

// ============================================================================
// Dirty Record Config
// ============================================================================

/// Dirty record handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirtyConfig {
    /// Capacity of the queue between the read loop and the collector
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Label attached to every dirty record of the job
    #[serde(default)]
    pub label: Option<String>,

    /// Where dirty records go
    #[serde(default)]
    pub collector: CollectorConfig,
}

impl Default for DirtyConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            label: None,
            collector: CollectorConfig::default(),
        }
    }
}

fn default_channel_capacity() -> usize {
    crate::dirty::DEFAULT_CHANNEL_CAPACITY
}

/// Dirty record collector selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectorConfig {
    /// Log dirty records
    Log {
        /// Log one record out of every `print_rate`
        #[serde(default = "default_print_rate")]
        print_rate: u64,
    },

    /// Append dirty records to a JSON-lines file
    JsonLines {
        /// Output file
        path: PathBuf,
    },
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self::Log {
            print_rate: default_print_rate(),
        }
    }
}

fn default_print_rate() -> u64 {
    1
}

// ============================================================================
// Metrics Config
// ============================================================================

/// Metric reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// External reporter, if any
    #[serde(default)]
    pub reporter: Option<ReporterConfig>,

    /// Treat reporter failures as fatal to the job
    #[serde(default)]
    pub fail_on_report_error: bool,
}

/// External metric reporter selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReporterConfig {
    /// Log the counters at job close
    Log,

    /// Push the counters to a Prometheus push gateway
    PushGateway {
        /// Gateway base URL
        url: String,
        /// Delete the metric group when the job closes
        #[serde(default)]
        delete_on_close: bool,
    },
}

// ============================================================================
// Runner Config
// ============================================================================

/// Settings of the in-process host runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Snapshot every N records (0 = only at partition end)
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: u64,

    /// Attempts per partition, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before retrying a failed partition
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            checkpoint_every: default_checkpoint_every(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

fn default_checkpoint_every() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    500
}
