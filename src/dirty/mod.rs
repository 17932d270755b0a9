//! Dirty record module
//!
//! Rows that fail conversion are diverted here instead of failing the
//! partition. The [`DirtyRecordSink`] counts them and forwards them to a
//! [`DirtyCollector`] on a background task.

mod collector;
mod sink;
mod types;

pub use collector::{
    build_collector, DirtyCollector, JsonLinesCollector, LogCollector, MemoryCollector,
};
pub use sink::{DirtyRecordSink, DEFAULT_CHANNEL_CAPACITY};
pub use types::DirtyRecord;
