//! State module
//!
//! Per-partition checkpoints used to resume a partition after a restart.
//!
//! # Overview
//!
//! - [`CheckpointState`] - snapshot of one partition's counters and resume
//!   token, produced by the reader engine
//! - [`CheckpointStore`] - keeps the latest snapshot per partition, in
//!   memory or in a JSON file

mod store;
mod types;

pub use store::CheckpointStore;
pub use types::{CheckpointFile, CheckpointState};
