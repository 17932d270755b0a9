//! Tests for host module

use super::*;
use crate::config::RunnerConfig;
use crate::error::{Error, Result};
use crate::partition::ScanRequest;
use crate::record::{ColumnSpec, ColumnType, FieldValue, Record};
use crate::source::{MemoryTableClient, ScanSource};
use crate::state::CheckpointStore;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type Seen = Arc<Mutex<Vec<(u32, i64)>>>;

fn client(rows: i64) -> MemoryTableClient {
    let data = (0..rows).map(|id| json!({"id": id})).collect();
    MemoryTableClient::new().with_table("items", data)
}

fn factory(
    client: MemoryTableClient,
    table: &str,
) -> impl Fn() -> Result<ScanSource<MemoryTableClient>> + Send + Sync + 'static {
    let request = ScanRequest::new(table).with_order_by("id").with_page_size(2);
    move || {
        ScanSource::new(
            client.clone(),
            request.clone(),
            vec![ColumnSpec::new("id", ColumnType::Int64)],
        )
    }
}

fn collecting_handler() -> (Arc<dyn RecordHandler>, Seen) {
    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    let handler = move |partition: u32, record: Record| -> Result<()> {
        if let Some(FieldValue::Int64(id)) = record.get(0) {
            sink.lock().unwrap().push((partition, *id));
        }
        Ok(())
    };
    let handler: Arc<dyn RecordHandler> = Arc::new(handler);
    (handler, seen)
}

fn settings(checkpoint_every: u64, max_attempts: u32) -> RunnerConfig {
    RunnerConfig {
        checkpoint_every,
        max_attempts,
        retry_delay_ms: 10,
    }
}

fn sorted_ids(seen: &Seen) -> Vec<i64> {
    let mut ids: Vec<i64> = seen.lock().unwrap().iter().map(|(_, id)| *id).collect();
    ids.sort_unstable();
    ids
}

// ============================================================================
// Run Tests
// ============================================================================

#[tokio::test]
async fn test_run_reads_every_partition() {
    let runner = LocalRunner::new(factory(client(20), "items"))
        .with_parallelism(4)
        .with_job_name("items-job");
    let (handler, seen) = collecting_handler();

    let summary = runner.run(handler).await.unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.planned, 4);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.partitions.len(), 4);
    assert_eq!(
        summary.partitions.iter().map(|p| p.records).sum::<u64>(),
        20
    );
    assert_eq!(summary.num_read(), 20);
    assert_eq!(sorted_ids(&seen), (0..20).collect::<Vec<_>>());

    // Every partition delivered its rows under its own index
    let seen = seen.lock().unwrap();
    for report in &summary.partitions {
        let count = seen.iter().filter(|(p, _)| *p == report.partition).count();
        assert_eq!(count as u64, report.records);
    }
}

#[tokio::test]
async fn test_run_marks_partitions_completed() {
    let checkpoints = CheckpointStore::in_memory();
    let runner = LocalRunner::new(factory(client(6), "items"))
        .with_parallelism(3)
        .with_checkpoints(checkpoints.clone());

    let (handler, _) = collecting_handler();
    runner.run(handler).await.unwrap();

    assert_eq!(checkpoints.completed().await.len(), 3);
    for index in 0..3 {
        assert_eq!(checkpoints.get(index).await.unwrap().num_read(), 2);
    }

    // A second run finds nothing left to do but still reports the totals
    let rerun = LocalRunner::new(factory(client(6), "items"))
        .with_parallelism(3)
        .with_checkpoints(checkpoints.clone());
    let (handler, seen) = collecting_handler();
    let summary = rerun.run(handler).await.unwrap();
    assert_eq!(summary.skipped, 3);
    assert!(summary.partitions.is_empty());
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(summary.num_read(), 6);
}

#[tokio::test]
async fn test_retry_resumes_from_checkpoint() {
    let client = client(10);
    let runner = LocalRunner::new(factory(client.clone(), "items")).with_settings(settings(2, 3));

    // Break the page after ids 4 and 5 exactly once
    let tripped = Arc::new(AtomicBool::new(false));
    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    let handler = move |partition: u32, record: Record| -> Result<()> {
        if let Some(FieldValue::Int64(id)) = record.get(0) {
            if *id == 4 && !tripped.swap(true, Ordering::SeqCst) {
                client.fail_next_fetches(1);
            }
            sink.lock().unwrap().push((partition, *id));
        }
        Ok(())
    };

    let summary = runner.run(Arc::new(handler)).await.unwrap();

    assert!(summary.is_success());
    let report = &summary.partitions[0];
    assert_eq!(report.attempts, 2);
    assert_eq!(report.records, 4);
    // Checkpointed after id 5, so nothing is delivered twice
    let ids: Vec<i64> = seen.lock().unwrap().iter().map(|(_, id)| *id).collect();
    assert_eq!(ids, (0..10).collect::<Vec<_>>());
    assert_eq!(summary.num_read(), 10);
}

#[tokio::test]
async fn test_retries_exhausted() {
    let client = client(4);
    client.fail_next_fetches(100);
    let runner = LocalRunner::new(factory(client, "items")).with_settings(settings(0, 2));
    let (handler, _) = collecting_handler();

    let summary = runner.run(handler).await.unwrap();

    assert!(!summary.is_success());
    let failed = summary.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attempts, 2);
    assert!(failed[0].error.as_deref().unwrap().contains("injected"));
}

#[tokio::test]
async fn test_planning_error_surfaces_per_partition() {
    let runner = LocalRunner::new(factory(client(4), "missing")).with_parallelism(2);
    let (handler, _) = collecting_handler();

    let summary = runner.run(handler).await.unwrap();

    assert_eq!(summary.planned, 1);
    let report = &summary.partitions[0];
    assert_eq!(report.attempts, 1);
    let message = report.error.as_deref().unwrap();
    assert!(message.starts_with("Partition planning failed"));
    assert!(message.contains("missing"));
}

#[tokio::test]
async fn test_handler_error_fails_partition() {
    let runner = LocalRunner::new(factory(client(3), "items")).with_settings(settings(0, 3));
    let handler = |_: u32, _: Record| -> Result<()> { Err(Error::Other("disk full".into())) };

    let summary = runner.run(Arc::new(handler)).await.unwrap();

    let report = &summary.partitions[0];
    assert_eq!(report.attempts, 1);
    assert_eq!(report.error.as_deref(), Some("disk full"));
}

#[tokio::test]
async fn test_checkpoint_file_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoints.json");
    let runner = LocalRunner::new(factory(client(5), "items"))
        .with_checkpoints(CheckpointStore::new(&path))
        .with_parallelism(2);
    let (handler, _) = collecting_handler();

    runner.run(handler).await.unwrap();

    let reloaded = CheckpointStore::from_file(&path).unwrap();
    assert_eq!(reloaded.completed().await.len(), 2);
    let total: u64 = {
        let mut sum = 0;
        for index in 0..2 {
            sum += reloaded.get(index).await.unwrap().num_read();
        }
        sum
    };
    assert_eq!(total, 5);
}
