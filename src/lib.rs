// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Solidafy Reader
//!
//! A partitioned, resumable table reader. A job is planned into partition
//! tokens, each token is read by its own engine, and every engine can be
//! checkpointed and restored without re-reading the rows before its last
//! checkpoint.
//!
//! ## Features
//!
//! - **Partition Planning**: Split a filtered table scan into row ranges
//! - **Lifecycle Engine**: Job and partition open/close hooks around a read loop
//! - **Throttling**: Byte-rate limiting per partition
//! - **Dirty Data**: Rows that fail conversion go to a collector, not the output
//! - **Metrics**: Per-worker accumulators, periodic aggregation and push reporting
//! - **Checkpoints**: Counters and resume tokens persisted per partition
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use solidafy_reader::config::ReaderConfig;
//! use solidafy_reader::database::DuckDbClient;
//! use solidafy_reader::host::LocalRunner;
//! use solidafy_reader::source::ScanSource;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> solidafy_reader::Result<()> {
//!     let config = ReaderConfig::from_file("orders.yaml")?;
//!     let client = DuckDbClient::open("warehouse.duckdb")?;
//!
//!     let factory = {
//!         let config = config.clone();
//!         move || ScanSource::from_config(client.clone(), &config)
//!     };
//!     let runner = LocalRunner::from_config(&config, factory);
//!
//!     let summary = runner
//!         .run(Arc::new(|partition: u32, record| {
//!             println!("{partition}: {record:?}");
//!             Ok(())
//!         }))
//!         .await?;
//!     println!("read {} records", summary.num_read());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Host Runtime                           │
//! │  plan() → tokens    run(handler) → RunSummary    checkpoints    │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌──────────────────────────────┴──────────────────────────────────┐
//! │                         Reader Engine                           │
//! │  job_open  partition_open  read_step  snapshot  close hooks     │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌──────────┬───────────┬───────┴───────┬───────────┬─────────────┐
//! │  Source  │  Cursor   │   Throttle    │   Dirty   │   Metrics   │
//! ├──────────┼───────────┼───────────────┼───────────┼─────────────┤
//! │ Scan     │ Paged     │ Bytes/sec     │ Log       │ Counters    │
//! │ DuckDB   │ Resume    │               │ JSON lines│ Accumulators│
//! │ Memory   │           │               │           │ Pushgateway │
//! └──────────┴───────────┴───────────────┴───────────┴─────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the reader
pub mod error;

/// Common types and type aliases
pub mod types;

/// Reader job configuration
pub mod config;

/// Column specs, field values and row conversion
pub mod record;

/// Scan requests, filters and partition planning
pub mod partition;

/// Paged result cursor
pub mod cursor;

/// Source capability set and the scan-based source
pub mod source;

/// DuckDB storage client
pub mod database;

/// Byte-rate throttling
pub mod rate_limit;

/// Counters, accumulators and reporters
pub mod metrics;

/// Dirty record collection
pub mod dirty;

/// Checkpoint state and persistence
pub mod state;

/// Per-partition lifecycle engine
pub mod engine;

/// In-process host runtime
pub mod host;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

pub use engine::{ReaderEngine, ReadOutcome};
pub use source::{ReaderSource, ScanSource};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
