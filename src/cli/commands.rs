//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Solidafy partitioned reader CLI
#[derive(Parser, Debug)]
#[command(name = "solidafy-reader")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Reader job configuration file (YAML)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the reader configuration
    Validate,

    /// Plan partitions and print one token per line
    Plan {
        /// DuckDB database file
        #[arg(short, long)]
        database: PathBuf,
    },

    /// Read all partitions
    Read {
        /// DuckDB database file
        #[arg(short, long)]
        database: PathBuf,

        /// Checkpoint file; completed partitions are skipped and failed ones
        /// resume from their last snapshot
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Job name reported with the metrics
        #[arg(long)]
        job_name: Option<String>,

        /// Write records to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
