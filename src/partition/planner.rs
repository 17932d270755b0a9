//! Partition planning

use super::types::{PartitionToken, ScanRequest};
use crate::error::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Splits a logical scan into partition tokens
#[async_trait]
pub trait PartitionPlanner: Send + Sync {
    /// Plan the tokens for a scan
    async fn plan(&self, request: &ScanRequest) -> Result<Vec<PartitionToken>>;
}

/// Plan partitions without failing
///
/// Always returns at least one token. A planner error becomes a single
/// error token that raises the failure when opened; an empty plan becomes a
/// single empty-scan token. Tokens are numbered from zero.
pub async fn plan_partitions<P>(planner: &P, request: &ScanRequest) -> Vec<PartitionToken>
where
    P: PartitionPlanner + ?Sized,
{
    match planner.plan(request).await {
        Ok(tokens) if tokens.is_empty() => {
            debug!(table = %request.table, "Scan matches no rows, planning empty token");
            vec![PartitionToken::empty(0)]
        }
        Ok(tokens) => {
            debug!(table = %request.table, count = tokens.len(), "Planned partitions");
            tokens
                .into_iter()
                .enumerate()
                .map(|(i, token)| token.with_index(i as u32))
                .collect()
        }
        Err(e) => {
            warn!(table = %request.table, error = %e, "Partition planning failed, deferring error to partition open");
            vec![PartitionToken::error(0, e.to_string())]
        }
    }
}

/// Split `total` rows into at most `partitions` contiguous ranges
///
/// Returns `(offset, limit)` pairs; sizes differ by at most one row. No
/// range is empty, so fewer ranges are returned when `total` is small.
pub fn split_range(total: u64, partitions: u32) -> Vec<(u64, u64)> {
    if total == 0 {
        return Vec::new();
    }
    let count = u64::from(partitions.max(1)).min(total);
    let base = total / count;
    let remainder = total % count;

    let mut ranges = Vec::with_capacity(count as usize);
    let mut offset = 0;
    for i in 0..count {
        let limit = base + u64::from(i < remainder);
        ranges.push((offset, limit));
        offset += limit;
    }
    ranges
}
