//! Host runtime module
//!
//! An in-process host that drives every partition of a job.
//!
//! # Overview
//!
//! [`LocalRunner`] plans the partition tokens, then runs one
//! [`crate::engine::ReaderEngine`] per token on its own tokio task. It
//! persists snapshots to a [`crate::state::CheckpointStore`] every
//! `checkpoint_every` records, skips partitions already completed, and
//! restarts a partition from its last checkpoint when it fails with a
//! retryable error.

mod runner;
mod types;

pub use runner::LocalRunner;
pub use types::{PartitionReport, RecordHandler, RunSummary};

#[cfg(test)]
mod tests;
