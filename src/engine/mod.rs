//! Reader engine module
//!
//! Per-partition open/close lifecycle and the read loop.
//!
//! # Overview
//!
//! The engine module provides:
//! - `ReaderEngine` - drives one partition token of a [`ReaderSource`]
//! - `EngineConfig` - throttling, dirty record and reporter settings
//! - `RuntimeContext` - worker identity and accumulator store from the host
//!
//! The host calls the hooks in this order:
//!
//! ```text
//! job_open → partition_open → read_step* → partition_close → job_close
//! ```
//!
//! `snapshot()` may be called at any point after `partition_open`.

mod types;

pub use types::{EngineConfig, LifecycleState, ReadOutcome, RuntimeContext};

use crate::dirty::{build_collector, DirtyCollector, DirtyRecordSink};
use crate::error::{Error, Result};
use crate::metrics::counters::READ_DURATION;
use crate::metrics::{build_reporter, AccumulatorAggregator, MetricReporter, ReaderCounters};
use crate::partition::PartitionToken;
use crate::rate_limit::ByteRateLimiter;
use crate::record::Record;
use crate::source::{Fetched, ReaderSource};
use crate::state::CheckpointState;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle engine for one partition of a reader source
pub struct ReaderEngine<S: ReaderSource> {
    /// Source-specific hooks
    source: S,
    config: EngineConfig,
    context: RuntimeContext,
    state: LifecycleState,
    /// Counters written by the read loop, read by the aggregator
    counters: Arc<ReaderCounters>,
    reporter: Option<Arc<dyn MetricReporter>>,
    /// Collector to use instead of the configured one
    collector: Option<Box<dyn DirtyCollector>>,
    aggregator: Option<AccumulatorAggregator>,
    limiter: Option<ByteRateLimiter>,
    dirty: Option<DirtyRecordSink>,
    partition_index: Option<u32>,
    /// Set at job open
    started: Option<Instant>,
    /// Read duration carried over from a restored checkpoint
    restored_duration_ms: u64,
    exhausted: bool,
    /// A fetch failed; the cursor must not be read again
    poisoned: bool,
}

impl<S: ReaderSource> ReaderEngine<S> {
    /// Create a new reader engine
    pub fn new(source: S, config: EngineConfig, context: RuntimeContext) -> Self {
        Self {
            source,
            config,
            context,
            state: LifecycleState::Created,
            counters: Arc::new(ReaderCounters::new()),
            reporter: None,
            collector: None,
            aggregator: None,
            limiter: None,
            dirty: None,
            partition_index: None,
            started: None,
            restored_duration_ms: 0,
            exhausted: false,
            poisoned: false,
        }
    }

    /// Send dirty records to `collector` instead of the configured one
    #[must_use]
    pub fn with_collector(mut self, collector: Box<dyn DirtyCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Use `reporter` instead of the configured one
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn MetricReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Live counters of this worker
    pub fn counters(&self) -> &Arc<ReaderCounters> {
        &self.counters
    }

    /// The source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Index of the open partition, once one was opened
    pub fn partition_index(&self) -> Option<u32> {
        self.partition_index
    }

    /// Whether the open partition was read to the end
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    // ========================================================================
    // Open
    // ========================================================================

    /// Open job-level resources
    ///
    /// Opens the metric reporter, starts duration accounting and opens the
    /// source. A source failure here is fatal to the job.
    pub async fn job_open(&mut self) -> Result<()> {
        if self.state != LifecycleState::Created {
            return Err(Error::lifecycle("open job", self.state));
        }
        info!(worker = %self.context.worker, "Opening reader job");

        if self.reporter.is_none() {
            if let Some(config) = &self.config.reporter {
                match build_reporter(config) {
                    Ok(reporter) => self.reporter = Some(reporter),
                    Err(e) => self.reporter_failure("build", &e)?,
                }
            }
        }
        if let Some(reporter) = &self.reporter {
            if let Err(e) = reporter.open(&self.context.worker).await {
                self.reporter_failure("open", &e)?;
            }
        }

        self.started = Some(Instant::now());
        self.source.open_job().await?;
        self.state = LifecycleState::JobOpened;
        Ok(())
    }

    /// Open a partition, restoring `prior` if the partition ran before
    ///
    /// Restored counter values are added to the live counters so metrics
    /// stay monotonic across restarts. Calling this again while the
    /// partition is open is a no-op.
    pub async fn partition_open(
        &mut self,
        token: &PartitionToken,
        prior: Option<CheckpointState>,
    ) -> Result<()> {
        match self.state {
            LifecycleState::JobOpened => {}
            state if state.is_partition_open() => {
                debug!(partition = token.index, "Partition already open");
                return Ok(());
            }
            state => return Err(Error::lifecycle("open partition", state)),
        }

        let mut aggregator = AccumulatorAggregator::new(
            self.context.worker.clone(),
            Arc::clone(&self.counters),
            Arc::clone(&self.context.accumulators),
            self.config.accumulator_interval,
        );
        aggregator.start();
        self.aggregator = Some(aggregator);

        let mut limiter =
            ByteRateLimiter::from_config(self.config.speed_bytes, Arc::clone(&self.counters));

        let resume = match prior {
            Some(checkpoint) => {
                if checkpoint.partition_index != token.index {
                    warn!(
                        partition = token.index,
                        checkpoint_partition = checkpoint.partition_index,
                        "Checkpoint belongs to another partition"
                    );
                }
                self.counters.restore(&checkpoint.metrics);
                self.restored_duration_ms = checkpoint.metric(READ_DURATION);
                info!(
                    partition = token.index,
                    num_read = checkpoint.num_read(),
                    "Restored checkpoint"
                );
                checkpoint.resume_token
            }
            None => None,
        };

        // After restore, so restored bytes are not charged again
        if let Some(limiter) = limiter.as_mut() {
            limiter.start();
        }
        self.limiter = limiter;

        let collector = self
            .collector
            .take()
            .unwrap_or_else(|| build_collector(&self.config.collector));
        self.dirty = Some(DirtyRecordSink::spawn(
            collector,
            self.config.dirty_channel_capacity,
            Arc::clone(&self.counters),
        ));

        self.partition_index = Some(token.index);
        self.state = LifecycleState::PartitionOpened;

        if let Err(e) = self.source.open_partition(token, resume.as_deref()).await {
            self.poisoned = true;
            warn!(partition = token.index, error = %e, "Failed to open partition");
            return Err(e);
        }

        debug!(
            worker = %self.context.worker,
            partition = token.index,
            throttled = self.limiter.is_some(),
            "Partition opened"
        );
        Ok(())
    }

    // ========================================================================
    // Read
    // ========================================================================

    /// Run one step of the read loop
    ///
    /// A row that fails conversion goes to the dirty record sink and yields
    /// [`ReadOutcome::Dirty`]; an empty page with more pending yields
    /// [`ReadOutcome::Pending`]. A fetch error is returned and poisons the
    /// partition. After the end of the partition, the source is not
    /// touched again.
    pub async fn read_step(&mut self) -> Result<ReadOutcome> {
        if !self.state.is_partition_open() {
            return Err(Error::lifecycle("read", self.state));
        }
        if self.poisoned {
            return Err(Error::lifecycle("read after a failed fetch", self.state));
        }
        if self.exhausted {
            return Ok(ReadOutcome::EndOfPartition);
        }

        if let Some(limiter) = self.limiter.as_mut() {
            limiter.acquire().await;
        }
        self.state = LifecycleState::Reading;

        let fetched = match self.source.fetch_next().await {
            Ok(fetched) => fetched,
            Err(e) => {
                self.poisoned = true;
                warn!(partition = ?self.partition_index, error = %e, "Fetch failed");
                return Err(e);
            }
        };

        match fetched {
            Fetched::Record(record) => {
                self.counters.add_record(record.estimated_size() as u64);
                self.flush_duration();
                Ok(ReadOutcome::Record(record))
            }
            Fetched::RowError(row_error) => {
                let label = self
                    .config
                    .dirty_label
                    .clone()
                    .or_else(|| row_error.column.clone());
                let message = row_error.message;
                if let Some(sink) = &self.dirty {
                    sink.collect(row_error.raw_row, &message, label.as_deref());
                }
                Ok(ReadOutcome::Dirty)
            }
            Fetched::Pending => Ok(ReadOutcome::Pending),
            Fetched::End => {
                self.exhausted = true;
                self.flush_duration();
                debug!(
                    partition = ?self.partition_index,
                    num_read = self.counters.num_read(),
                    "End of partition"
                );
                Ok(ReadOutcome::EndOfPartition)
            }
        }
    }

    /// Read until the next record, skipping dirty rows and empty pages
    pub async fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            match self.read_step().await? {
                ReadOutcome::Record(record) => return Ok(Some(record)),
                ReadOutcome::Dirty | ReadOutcome::Pending => {}
                ReadOutcome::EndOfPartition => return Ok(None),
            }
        }
    }

    /// Capture the partition's counters and resume position
    ///
    /// Does not touch the live counters.
    pub fn snapshot(&self) -> Result<CheckpointState> {
        let index = self
            .partition_index
            .ok_or_else(|| Error::lifecycle("snapshot", self.state))?;

        Ok(CheckpointState::new(index)
            .with_metrics(self.counters.snapshot())
            .with_resume_token(self.source.resume_token()))
    }

    // ========================================================================
    // Close
    // ========================================================================

    /// Close the partition: source first, then the dirty record sink
    ///
    /// The sink is closed even when the source fails; the source error is
    /// returned. No-op unless a partition is open.
    pub async fn partition_close(&mut self) -> Result<()> {
        if !self.state.is_partition_open() {
            return Ok(());
        }
        self.state = LifecycleState::PartitionClosed;

        let result = self.source.close_partition().await;
        if let Some(mut sink) = self.dirty.take() {
            sink.close().await;
        }

        debug!(partition = ?self.partition_index, "Partition closed");
        result
    }

    /// Release everything; a second call is a no-op
    ///
    /// Closes a partition left open, finalizes the duration counter, stops
    /// the rate limiter and the aggregator (which pushes one last time),
    /// then reports to and closes the metric reporter.
    pub async fn job_close(&mut self) -> Result<()> {
        if self.state == LifecycleState::JobClosed {
            return Ok(());
        }
        let mut result = Ok(());
        if self.state.is_partition_open() {
            if let Err(e) = self.partition_close().await {
                warn!(error = %e, "Failed to close partition during job close");
                result = Err(e);
            }
        }
        self.state = LifecycleState::JobClosed;

        self.flush_duration();
        if let Some(mut limiter) = self.limiter.take() {
            limiter.stop();
        }
        if let Some(mut aggregator) = self.aggregator.take() {
            aggregator.close().await;
        }

        if let Some(reporter) = self.reporter.take() {
            let worker = &self.context.worker;
            if let Err(e) = reporter.report(worker, &self.counters.snapshot()).await {
                result = result.and(self.reporter_failure("report", &e));
            }
            if let Err(e) = reporter.close(worker).await {
                result = result.and(self.reporter_failure("close", &e));
            }
        }

        let closed = self.source.close_job().await;

        info!(
            worker = %self.context.worker,
            num_read = self.counters.num_read(),
            bytes_read = self.counters.bytes_read(),
            duration_ms = self.counters.read_duration_ms(),
            dirty = self.counters.dirty_consumed(),
            "Reader job closed"
        );
        result.and(closed)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn flush_duration(&self) {
        if let Some(started) = self.started {
            let elapsed = started.elapsed().as_millis() as u64;
            self.counters
                .set_duration_ms(self.restored_duration_ms + elapsed);
        }
    }

    fn reporter_failure(&self, operation: &str, error: &Error) -> Result<()> {
        if self.config.fail_on_report_error {
            return Err(Error::reporter(format!("{operation} failed: {error}")));
        }
        warn!(
            worker = %self.context.worker,
            operation,
            error = %error,
            "Metric reporter failed"
        );
        Ok(())
    }
}

impl<S: ReaderSource> std::fmt::Debug for ReaderEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderEngine")
            .field("worker", &self.context.worker)
            .field("state", &self.state)
            .field("partition_index", &self.partition_index)
            .field("exhausted", &self.exhausted)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}
