//! Local runner - drives all partitions of a job in-process

use super::types::{PartitionReport, RecordHandler, RunSummary};
use crate::config::{ReaderConfig, RunnerConfig};
use crate::engine::{EngineConfig, ReaderEngine, RuntimeContext};
use crate::error::{Error, Result};
use crate::metrics::{AccumulatorStore, InMemoryAccumulatorStore, WorkerId, DEFAULT_JOB_NAME};
use crate::partition::PartitionToken;
use crate::source::ReaderSource;
use crate::state::{CheckpointState, CheckpointStore};
use futures::future::join_all;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// In-process host runtime
///
/// `factory` builds a fresh source for planning and for every partition
/// attempt, so no source instance is shared between workers.
pub struct LocalRunner<S, F> {
    factory: Arc<F>,
    engine_config: EngineConfig,
    settings: RunnerConfig,
    parallelism: u32,
    job_name: String,
    checkpoints: CheckpointStore,
    accumulators: Arc<InMemoryAccumulatorStore>,
    _source: PhantomData<fn() -> S>,
}

impl<S, F> LocalRunner<S, F>
where
    S: ReaderSource + 'static,
    F: Fn() -> Result<S> + Send + Sync + 'static,
{
    /// Create a new runner with default settings and in-memory checkpoints
    pub fn new(factory: F) -> Self {
        Self {
            factory: Arc::new(factory),
            engine_config: EngineConfig::default(),
            settings: RunnerConfig::default(),
            parallelism: 1,
            job_name: DEFAULT_JOB_NAME.to_string(),
            checkpoints: CheckpointStore::in_memory(),
            accumulators: Arc::new(InMemoryAccumulatorStore::new()),
            _source: PhantomData,
        }
    }

    /// Create a runner taking its settings from a reader job config
    pub fn from_config(config: &ReaderConfig, factory: F) -> Self {
        Self::new(factory)
            .with_engine_config(EngineConfig::from_reader_config(config))
            .with_settings(config.runner.clone())
            .with_parallelism(config.parallelism)
    }

    /// Set the engine configuration
    #[must_use]
    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    /// Set checkpoint and retry settings
    #[must_use]
    pub fn with_settings(mut self, settings: RunnerConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Set the minimum number of partitions to plan
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Set the job name reported with every worker
    #[must_use]
    pub fn with_job_name(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = job_name.into();
        self
    }

    /// Set the checkpoint store
    #[must_use]
    pub fn with_checkpoints(mut self, checkpoints: CheckpointStore) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    /// The checkpoint store
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// The accumulator store shared by all workers
    pub fn accumulators(&self) -> &Arc<InMemoryAccumulatorStore> {
        &self.accumulators
    }

    /// Plan the partition tokens of the job
    pub async fn plan(&self) -> Result<Vec<PartitionToken>> {
        let source = (self.factory)()?;
        Ok(source.plan_partitions(self.parallelism).await)
    }

    /// Read every partition not yet completed, handing records to `handler`
    ///
    /// Partition failures are reported in the summary rather than returned.
    pub async fn run(&self, handler: Arc<dyn RecordHandler>) -> Result<RunSummary> {
        let tokens = self.plan().await?;
        let planned = tokens.len();
        info!(job = %self.job_name, partitions = planned, "Planned partitions");

        let mut skipped = 0;
        let mut tasks = Vec::with_capacity(planned);
        for (subtask, token) in tokens.into_iter().enumerate() {
            let worker = WorkerId::new(self.job_name.clone(), subtask as u32);
            if self.checkpoints.is_completed(token.index).await {
                debug!(partition = token.index, "Partition already completed, skipping");
                // Totals still cover what the earlier run read
                if let Some(state) = self.checkpoints.get(token.index).await {
                    self.accumulators.publish(&worker, &state.metrics).await?;
                }
                skipped += 1;
                continue;
            }

            let task = PartitionTask {
                worker,
                token,
                factory: Arc::clone(&self.factory),
                engine_config: self.engine_config.clone(),
                settings: self.settings.clone(),
                checkpoints: self.checkpoints.clone(),
                accumulators: Arc::clone(&self.accumulators) as Arc<dyn AccumulatorStore>,
                handler: Arc::clone(&handler),
                _source: PhantomData,
            };
            tasks.push(tokio::spawn(task.run()));
        }

        let mut partitions = Vec::with_capacity(tasks.len());
        for joined in join_all(tasks).await {
            let report =
                joined.map_err(|e| Error::Other(format!("Partition task panicked: {e}")))?;
            partitions.push(report);
        }
        partitions.sort_by_key(|report| report.partition);

        let summary = RunSummary {
            planned,
            skipped,
            partitions,
            totals: self.accumulators.totals().await,
        };
        info!(
            job = %self.job_name,
            planned,
            skipped,
            failed = summary.failed().len(),
            num_read = summary.num_read(),
            dirty = summary.dirty(),
            "Run finished"
        );
        Ok(summary)
    }
}

/// Everything one partition task owns
struct PartitionTask<S, F> {
    worker: WorkerId,
    token: PartitionToken,
    factory: Arc<F>,
    engine_config: EngineConfig,
    settings: RunnerConfig,
    checkpoints: CheckpointStore,
    accumulators: Arc<dyn AccumulatorStore>,
    handler: Arc<dyn RecordHandler>,
    _source: PhantomData<fn() -> S>,
}

impl<S, F> PartitionTask<S, F>
where
    S: ReaderSource + 'static,
    F: Fn() -> Result<S> + Send + Sync + 'static,
{
    async fn run(self) -> PartitionReport {
        let partition = self.token.index;
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let mut records = 0;
            match self.attempt(&mut records).await {
                Ok(()) => {
                    debug!(partition, attempts, records, "Partition completed");
                    return PartitionReport {
                        partition,
                        attempts,
                        records,
                        error: None,
                    };
                }
                Err(e) if e.is_retryable() && attempts < max_attempts => {
                    warn!(
                        partition,
                        attempt = attempts,
                        error = %e,
                        "Partition failed, restarting from last checkpoint"
                    );
                    tokio::time::sleep(Duration::from_millis(self.settings.retry_delay_ms)).await;
                }
                Err(e) => {
                    error!(partition, attempts, error = %e, "Partition failed");
                    return PartitionReport {
                        partition,
                        attempts,
                        records,
                        error: Some(e.to_string()),
                    };
                }
            }
        }
    }

    /// One attempt with a fresh engine; the job is closed whatever happens
    async fn attempt(&self, records: &mut u64) -> Result<()> {
        let source = (self.factory)()?;
        let context = RuntimeContext::new(self.worker.clone(), Arc::clone(&self.accumulators));
        let mut engine = ReaderEngine::new(source, self.engine_config.clone(), context);
        let prior = self.checkpoints.get(self.token.index).await;

        let read = self.read(&mut engine, prior, records).await;
        let closed = engine.job_close().await;
        read?;
        closed?;

        self.checkpoints.put(engine.snapshot()?).await?;
        self.checkpoints.mark_completed(self.token.index).await
    }

    async fn read(
        &self,
        engine: &mut ReaderEngine<S>,
        prior: Option<CheckpointState>,
        records: &mut u64,
    ) -> Result<()> {
        engine.job_open().await?;
        engine.partition_open(&self.token, prior).await?;

        let every = self.settings.checkpoint_every;
        let mut since_checkpoint = 0;
        while let Some(record) = engine.next_record().await? {
            self.handler.handle(self.token.index, record)?;
            *records += 1;
            since_checkpoint += 1;
            if every > 0 && since_checkpoint >= every {
                self.checkpoints.put(engine.snapshot()?).await?;
                since_checkpoint = 0;
            }
        }

        engine.partition_close().await
    }
}
