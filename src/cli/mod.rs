//! CLI module
//!
//! Command-line interface for running reader jobs against DuckDB.
//!
//! # Commands
//!
//! - `validate` - Check a reader config
//! - `plan` - Print the partition tokens of a job
//! - `read` - Read every partition and write records as JSON lines

mod commands;
mod runner;

pub use commands::{Cli, Commands};
pub use runner::{JsonLinesOutput, Runner};
