//! Dirty record sink
//!
//! Hands dirty records from the read loop to a writer task over a bounded
//! channel. `collect` never waits: a full or closed channel counts the
//! record as failed instead.

use super::collector::DirtyCollector;
use super::types::DirtyRecord;
use crate::metrics::ReaderCounters;
use crate::types::JsonValue;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default channel capacity between the read loop and the writer task
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Receives rows that failed conversion and forwards them to a collector
#[derive(Debug)]
pub struct DirtyRecordSink {
    sender: Option<mpsc::Sender<DirtyRecord>>,
    task: Option<JoinHandle<()>>,
    counters: Arc<ReaderCounters>,
}

impl DirtyRecordSink {
    /// Spawn the writer task for `collector`
    pub fn spawn(
        collector: Box<dyn DirtyCollector>,
        capacity: usize,
        counters: Arc<ReaderCounters>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(run_writer(receiver, collector, Arc::clone(&counters)));

        Self {
            sender: Some(sender),
            task: Some(task),
            counters,
        }
    }

    /// Divert one raw row
    ///
    /// Always counts the row as consumed; counts it as failed too when it
    /// cannot be handed to the writer task.
    pub fn collect(&self, raw_row: JsonValue, error: &impl Display, label: Option<&str>) {
        self.counters.add_dirty();
        let record = DirtyRecord::new(raw_row, error.to_string(), label.map(str::to_string));

        let Some(sender) = &self.sender else {
            self.counters.add_dirty_failed();
            warn!("Dirty record sink already closed, dropping record");
            return;
        };

        if let Err(e) = sender.try_send(record) {
            self.counters.add_dirty_failed();
            match e {
                TrySendError::Full(_) => warn!("Dirty record channel full, dropping record"),
                TrySendError::Closed(_) => warn!("Dirty record writer stopped, dropping record"),
            }
        }
    }

    /// Check if the sink was closed
    pub fn is_closed(&self) -> bool {
        self.sender.is_none()
    }

    /// Drain pending records, then flush and close the collector
    ///
    /// A second call is a no-op.
    pub async fn close(&mut self) {
        self.sender = None;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Dirty record writer task ended abnormally");
            }
            debug!(
                consumed = self.counters.dirty_consumed(),
                failed = self.counters.dirty_failed(),
                "Dirty record sink closed"
            );
        }
    }
}

async fn run_writer(
    mut receiver: mpsc::Receiver<DirtyRecord>,
    mut collector: Box<dyn DirtyCollector>,
    counters: Arc<ReaderCounters>,
) {
    while let Some(record) = receiver.recv().await {
        if let Err(e) = collector.write(&record).await {
            counters.add_dirty_failed();
            warn!(error = %e, "Failed to write dirty record");
        }
    }

    if let Err(e) = collector.flush().await {
        warn!(error = %e, "Failed to flush dirty record collector");
    }
    if let Err(e) = collector.close().await {
        warn!(error = %e, "Failed to close dirty record collector");
    }
}
