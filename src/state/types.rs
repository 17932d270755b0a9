//! Checkpoint types
//!
//! These types are serialized to JSON and persisted between runs.

use crate::metrics::counters::NUM_READ;
use crate::types::MetricValues;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Snapshot of one partition's progress
///
/// Persisted as `{ partitionIndex, metrics, resumeToken }`, the resume
/// token encoded as base64.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointState {
    /// Index of the partition token
    pub partition_index: u32,
    /// Accumulated counter values
    #[serde(default)]
    pub metrics: MetricValues,
    /// Source-specific position marker
    #[serde(default, with = "crate::types::base64_bytes_opt")]
    pub resume_token: Option<Vec<u8>>,
}

impl CheckpointState {
    /// Create an empty state for a partition
    pub fn new(partition_index: u32) -> Self {
        Self {
            partition_index,
            ..Self::default()
        }
    }

    /// Set the counter values
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricValues) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set the resume token
    #[must_use]
    pub fn with_resume_token(mut self, token: Option<Vec<u8>>) -> Self {
        self.resume_token = token;
        self
    }

    /// Value of a metric, zero when absent
    pub fn metric(&self, name: &str) -> u64 {
        self.metrics.get(name).copied().unwrap_or_default()
    }

    /// Records read up to this snapshot
    pub fn num_read(&self) -> u64 {
        self.metric(NUM_READ)
    }
}

/// Persisted checkpoints of a job, keyed by partition index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointFile {
    /// Latest snapshot per partition
    #[serde(default)]
    pub partitions: BTreeMap<u32, CheckpointState>,
    /// Partitions read to the end
    #[serde(default)]
    pub completed: BTreeSet<u32>,
}

impl CheckpointFile {
    /// Create an empty checkpoint file
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checkpoint_state_layout() {
        let mut metrics = MetricValues::new();
        metrics.insert(NUM_READ.to_string(), 3);
        let state = CheckpointState::new(2)
            .with_metrics(metrics)
            .with_resume_token(Some(vec![3, 0, 0, 0, 0, 0, 0, 0]));

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(
            value,
            json!({
                "partitionIndex": 2,
                "metrics": {"num_read": 3},
                "resumeToken": "AwAAAAAAAAA="
            })
        );

        let restored: CheckpointState = serde_json::from_value(value).unwrap();
        assert_eq!(restored, state);
        assert_eq!(restored.num_read(), 3);
    }

    #[test]
    fn test_checkpoint_state_null_resume_token() {
        let state: CheckpointState =
            serde_json::from_value(json!({"partitionIndex": 0, "resumeToken": null})).unwrap();
        assert_eq!(state, CheckpointState::new(0));
        assert_eq!(state.metric("byte_read"), 0);
    }

    #[test]
    fn test_checkpoint_state_rejects_bad_base64() {
        let result: Result<CheckpointState, _> =
            serde_json::from_value(json!({"partitionIndex": 0, "resumeToken": "!!"}));
        assert!(result.is_err());
    }
}
