//! Partition planning module
//!
//! Splits a logical scan into independently resumable partition tokens.
//!
//! # Overview
//!
//! A [`PartitionPlanner`] runs once per job, before any reader opens. Each
//! [`PartitionToken`] it produces is serializable, immutable and handed to
//! exactly one reader. Planning never fails from the caller's point of
//! view: [`plan_partitions`] turns a planner error into a sentinel token
//! whose error surfaces when the token is opened, and an empty plan into a
//! single empty-scan token.

mod filter;
mod planner;
mod types;

pub use filter::{quote_identifier, CompareOp, Condition, FilterExpr};
pub use planner::{plan_partitions, split_range, PartitionPlanner};
pub use types::{PartitionToken, ScanRequest, ScanToken, TokenKind};

#[cfg(test)]
mod tests;
