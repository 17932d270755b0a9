//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands};
use crate::config::ReaderConfig;
use crate::database::DuckDbClient;
use crate::error::{Error, Result};
use crate::host::{LocalRunner, RecordHandler};
use crate::metrics::DEFAULT_JOB_NAME;
use crate::record::{ColumnSpec, Record};
use crate::source::{ReaderSource, ScanSource};
use crate::state::CheckpointStore;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Validate => self.validate(),
            Commands::Plan { database } => self.plan(database).await,
            Commands::Read {
                database,
                checkpoint,
                job_name,
                output,
            } => {
                self.read(
                    database,
                    checkpoint.as_deref(),
                    job_name.as_deref(),
                    output.as_deref(),
                )
                .await
            }
        }
    }

    /// Load the reader configuration
    fn load_config(&self) -> Result<ReaderConfig> {
        let path = self
            .cli
            .config
            .as_ref()
            .ok_or_else(|| Error::config("Config file not specified (use -C flag)"))?;
        ReaderConfig::from_file(path)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        let config = self.load_config()?;
        println!(
            "{}",
            serde_json::json!({
                "status": "VALID",
                "table": config.table,
                "columns": config.columns.len(),
            })
        );
        Ok(())
    }

    /// Print the partition tokens
    async fn plan(&self, database: &Path) -> Result<()> {
        let config = self.load_config()?;
        let client = DuckDbClient::open(database)?;
        let source = ScanSource::from_config(client, &config)?;

        let tokens = source.plan_partitions(config.parallelism).await;
        for token in &tokens {
            println!("{}", serde_json::to_string(token)?);
        }
        Ok(())
    }

    /// Read every partition
    async fn read(
        &self,
        database: &Path,
        checkpoint: Option<&Path>,
        job_name: Option<&str>,
        output: Option<&Path>,
    ) -> Result<()> {
        let config = self.load_config()?;
        let client = DuckDbClient::open(database)?;
        let checkpoints = match checkpoint {
            Some(path) => CheckpointStore::from_file(path)?,
            None => CheckpointStore::in_memory(),
        };

        let factory = {
            let config = config.clone();
            move || ScanSource::from_config(client.clone(), &config)
        };
        let runner = LocalRunner::from_config(&config, factory)
            .with_checkpoints(checkpoints)
            .with_job_name(job_name.unwrap_or(DEFAULT_JOB_NAME));

        let writer = Arc::new(match output {
            Some(path) => JsonLinesOutput::create(path, config.columns.clone())?,
            None => JsonLinesOutput::stdout(config.columns.clone()),
        });
        let summary = runner.run(Arc::clone(&writer) as Arc<dyn RecordHandler>).await?;
        writer.flush()?;

        eprintln!("{}", serde_json::to_string_pretty(&summary)?);

        let failed = summary.failed().len();
        if failed > 0 {
            return Err(Error::Other(format!(
                "{failed} of {} partitions failed",
                summary.partitions.len()
            )));
        }
        Ok(())
    }
}

/// Writes records as JSON objects, one per line
pub struct JsonLinesOutput {
    columns: Vec<ColumnSpec>,
    out: Mutex<BufWriter<Box<dyn Write + Send>>>,
}

impl JsonLinesOutput {
    /// Write to stdout
    pub fn stdout(columns: Vec<ColumnSpec>) -> Self {
        Self::new(columns, Box::new(io::stdout()))
    }

    /// Create (or truncate) `path` and write to it
    pub fn create(path: &Path, columns: Vec<ColumnSpec>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(columns, Box::new(file)))
    }

    /// Write to any writer
    pub fn new(columns: Vec<ColumnSpec>, out: Box<dyn Write + Send>) -> Self {
        Self {
            columns,
            out: Mutex::new(BufWriter::new(out)),
        }
    }

    /// Flush buffered lines
    pub fn flush(&self) -> Result<()> {
        self.lock()?.flush()?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BufWriter<Box<dyn Write + Send>>>> {
        self.out
            .lock()
            .map_err(|_| Error::Other("Output writer lock poisoned".to_string()))
    }
}

impl RecordHandler for JsonLinesOutput {
    fn handle(&self, _partition: u32, record: Record) -> Result<()> {
        let line = serde_json::to_string(&record.to_json(&self.columns))?;
        writeln!(self.lock()?, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ColumnType, FieldValue};

    #[test]
    fn test_json_lines_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let columns = vec![
            ColumnSpec::new("id", ColumnType::Int64),
            ColumnSpec::new("name", ColumnType::String),
        ];

        let output = JsonLinesOutput::create(&path, columns).unwrap();
        output
            .handle(
                0,
                Record::new(vec![FieldValue::Int64(1), FieldValue::String("a".into())]),
            )
            .unwrap();
        output
            .handle(1, Record::new(vec![FieldValue::Int64(2), FieldValue::Null]))
            .unwrap();
        output.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec![r#"{"id":1,"name":"a"}"#, r#"{"id":2,"name":null}"#]);
    }

    #[tokio::test]
    async fn test_missing_config_flag() {
        use clap::Parser;

        let cli = Cli::parse_from(["solidafy-reader", "validate"]);
        let err = Runner::new(cli).run().await.unwrap_err();
        assert!(err.to_string().contains("-C"));
    }
}
