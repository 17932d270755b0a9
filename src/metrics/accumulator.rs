//! Accumulator aggregation
//!
//! Periodically publishes one worker's counters into a host-visible
//! accumulator store so a coordinator can sum them across workers.

use super::counters::ReaderCounters;
use crate::error::Result;
use crate::types::MetricValues;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default job name used when the host does not supply one
pub const DEFAULT_JOB_NAME: &str = "defaultJobName";

// ============================================================================
// Worker Identity
// ============================================================================

/// Identity of one parallel reader instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId {
    /// Job the worker belongs to
    pub job_name: String,
    /// Zero-based index of the worker within the job
    pub subtask_index: u32,
}

impl WorkerId {
    /// Create a new worker identity
    pub fn new(job_name: impl Into<String>, subtask_index: u32) -> Self {
        Self {
            job_name: job_name.into(),
            subtask_index,
        }
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new(DEFAULT_JOB_NAME, 0)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.job_name, self.subtask_index)
    }
}

// ============================================================================
// Accumulator Store
// ============================================================================

/// Host-visible store of per-worker accumulator values
#[async_trait]
pub trait AccumulatorStore: Send + Sync {
    /// Publish the latest counter values of one worker
    async fn publish(&self, worker: &WorkerId, values: &MetricValues) -> Result<()>;
}

/// Accumulator store kept in process memory
///
/// Keeps the last published values per worker; totals are the sum over
/// all workers.
#[derive(Debug, Default)]
pub struct InMemoryAccumulatorStore {
    workers: RwLock<HashMap<WorkerId, MetricValues>>,
}

impl InMemoryAccumulatorStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Last values published by a worker
    pub async fn worker(&self, worker: &WorkerId) -> Option<MetricValues> {
        self.workers.read().await.get(worker).cloned()
    }

    /// Sum of every metric over all workers
    pub async fn totals(&self) -> MetricValues {
        let workers = self.workers.read().await;
        let mut totals = MetricValues::new();
        for values in workers.values() {
            for (name, value) in values {
                *totals.entry(name.clone()).or_default() += value;
            }
        }
        totals
    }

    /// Sum of one metric over all workers
    pub async fn total(&self, name: &str) -> u64 {
        let workers = self.workers.read().await;
        workers.values().filter_map(|values| values.get(name)).sum()
    }
}

#[async_trait]
impl AccumulatorStore for InMemoryAccumulatorStore {
    async fn publish(&self, worker: &WorkerId, values: &MetricValues) -> Result<()> {
        self.workers
            .write()
            .await
            .insert(worker.clone(), values.clone());
        Ok(())
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// Pushes a worker's counters to an [`AccumulatorStore`] on a fixed schedule
///
/// A failed push is logged and counted; the next tick tries again.
pub struct AccumulatorAggregator {
    worker: WorkerId,
    counters: Arc<ReaderCounters>,
    store: Arc<dyn AccumulatorStore>,
    interval: Duration,
    failed_pushes: Arc<AtomicU64>,
    task: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
    closed: bool,
}

impl AccumulatorAggregator {
    /// Create an aggregator bound to one worker's counters
    pub fn new(
        worker: WorkerId,
        counters: Arc<ReaderCounters>,
        store: Arc<dyn AccumulatorStore>,
        interval: Duration,
    ) -> Self {
        Self {
            worker,
            counters,
            store,
            interval,
            failed_pushes: Arc::new(AtomicU64::new(0)),
            task: None,
            closed: false,
        }
    }

    /// Start the periodic push. Calling it again while running is a no-op.
    pub fn start(&mut self) {
        if self.task.is_some() || self.closed {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let worker = self.worker.clone();
        let counters = Arc::clone(&self.counters);
        let store = Arc::clone(&self.store);
        let failed = Arc::clone(&self.failed_pushes);
        let period = self.interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let _ = push_once(&worker, &counters, store.as_ref(), &failed).await;
                    }
                }
            }
        });

        tracing::debug!(worker = %self.worker, interval_ms = period.as_millis() as u64, "Accumulator aggregator started");
        self.task = Some((shutdown_tx, handle));
    }

    /// Push the current counter values once
    pub async fn push(&self) -> Result<()> {
        push_once(
            &self.worker,
            &self.counters,
            self.store.as_ref(),
            &self.failed_pushes,
        )
        .await
    }

    /// Number of pushes that failed so far
    pub fn failed_pushes(&self) -> u64 {
        self.failed_pushes.load(Ordering::Relaxed)
    }

    /// Whether the background push is running
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Stop the periodic push and publish the final values
    ///
    /// Waits for a push already in flight. A second call is a no-op.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some((shutdown_tx, handle)) = self.task.take() {
            let _ = shutdown_tx.send(());
            if let Err(e) = handle.await {
                tracing::warn!(worker = %self.worker, error = %e, "Accumulator task ended abnormally");
            }
        }

        // Final push; failure was already logged and counted
        let _ = self.push().await;
        tracing::debug!(worker = %self.worker, "Accumulator aggregator closed");
    }
}

impl Drop for AccumulatorAggregator {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.task.take() {
            handle.abort();
        }
    }
}

impl fmt::Debug for AccumulatorAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccumulatorAggregator")
            .field("worker", &self.worker)
            .field("interval", &self.interval)
            .field("running", &self.task.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

async fn push_once(
    worker: &WorkerId,
    counters: &ReaderCounters,
    store: &dyn AccumulatorStore,
    failed: &AtomicU64,
) -> Result<()> {
    let values = counters.snapshot();
    match store.publish(worker, &values).await {
        Ok(()) => Ok(()),
        Err(e) => {
            failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(worker = %worker, error = %e, "Failed to push accumulators, retrying next cycle");
            Err(e)
        }
    }
}
