//! Metrics module
//!
//! Per-worker counters, accumulator aggregation and external reporters.
//!
//! # Overview
//!
//! - [`ReaderCounters`] - atomic counters written by the read loop
//! - [`AccumulatorAggregator`] - periodic push of counters to an
//!   [`AccumulatorStore`]
//! - [`MetricReporter`] - optional transport for final worker metrics

mod accumulator;
pub mod counters;
mod reporter;

pub use accumulator::{
    AccumulatorAggregator, AccumulatorStore, InMemoryAccumulatorStore, WorkerId,
    DEFAULT_JOB_NAME,
};
pub use counters::ReaderCounters;
pub use reporter::{
    build_reporter, render_text_format, LogReporter, MetricReporter, PushGatewayReporter,
    METRIC_PREFIX,
};

#[cfg(test)]
mod tests;
