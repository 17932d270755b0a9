//! Tests for metrics module

use super::counters::{BYTE_READ, DIRTY_DATA_COUNT, NUM_READ, READ_DURATION};
use super::*;
use crate::config::ReporterConfig;
use crate::error::{Error, Result};
use crate::types::MetricValues;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Counter Tests
// ============================================================================

#[test]
fn test_counters_snapshot() {
    let counters = ReaderCounters::new();
    counters.add_record(10);
    counters.add_record(5);
    counters.add_dirty();
    counters.set_duration_ms(250);

    let snapshot = counters.snapshot();
    assert_eq!(snapshot.len(), 5);
    assert_eq!(snapshot[NUM_READ], 2);
    assert_eq!(snapshot[BYTE_READ], 15);
    assert_eq!(snapshot[READ_DURATION], 250);
    assert_eq!(snapshot[DIRTY_DATA_COUNT], 1);
}

#[test]
fn test_counters_snapshot_does_not_mutate() {
    let counters = ReaderCounters::new();
    counters.add_record(3);
    assert_eq!(counters.snapshot(), counters.snapshot());
    assert_eq!(counters.num_read(), 1);
}

#[test]
fn test_counters_restore_adds_saved_values() {
    let counters = ReaderCounters::new();
    counters.add_record(4);

    let mut saved = MetricValues::new();
    saved.insert(NUM_READ.to_string(), 10);
    saved.insert(BYTE_READ.to_string(), 100);
    saved.insert("unknown_metric".to_string(), 7);
    counters.restore(&saved);

    assert_eq!(counters.num_read(), 11);
    assert_eq!(counters.bytes_read(), 104);
    assert_eq!(counters.get("unknown_metric"), None);
}

// ============================================================================
// Accumulator Store Tests
// ============================================================================

fn values(num_read: u64) -> MetricValues {
    let mut values = MetricValues::new();
    values.insert(NUM_READ.to_string(), num_read);
    values
}

#[tokio::test]
async fn test_in_memory_store_keeps_last_value_per_worker() {
    let store = InMemoryAccumulatorStore::new();
    let a = WorkerId::new("job", 0);
    let b = WorkerId::new("job", 1);

    store.publish(&a, &values(1)).await.unwrap();
    store.publish(&a, &values(5)).await.unwrap();
    store.publish(&b, &values(7)).await.unwrap();

    assert_eq!(store.worker(&a).await, Some(values(5)));
    assert_eq!(store.total(NUM_READ).await, 12);
    assert_eq!(store.totals().await, values(12));
}

#[test]
fn test_worker_id_default() {
    let worker = WorkerId::default();
    assert_eq!(worker.job_name, DEFAULT_JOB_NAME);
    assert_eq!(worker.to_string(), "defaultJobName#0");
}

// ============================================================================
// Aggregator Tests
// ============================================================================

/// Store that rejects the first `failures` publishes
struct FlakyStore {
    inner: InMemoryAccumulatorStore,
    failures: AtomicU32,
}

impl FlakyStore {
    fn new(failures: u32) -> Self {
        Self {
            inner: InMemoryAccumulatorStore::new(),
            failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl AccumulatorStore for FlakyStore {
    async fn publish(&self, worker: &WorkerId, values: &MetricValues) -> Result<()> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::accumulator("store unavailable"));
        }
        self.inner.publish(worker, values).await
    }
}

#[tokio::test]
async fn test_aggregator_pushes_periodically() {
    let counters = Arc::new(ReaderCounters::new());
    let store = Arc::new(InMemoryAccumulatorStore::new());
    let worker = WorkerId::new("job", 2);
    let mut aggregator = AccumulatorAggregator::new(
        worker.clone(),
        Arc::clone(&counters),
        store.clone(),
        Duration::from_millis(10),
    );

    aggregator.start();
    assert!(aggregator.is_running());
    counters.add_record(8);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(store.worker(&worker).await.unwrap()[NUM_READ], 1);
    aggregator.close().await;
}

#[tokio::test]
async fn test_aggregator_survives_failed_pushes() {
    let counters = Arc::new(ReaderCounters::new());
    let store = Arc::new(FlakyStore::new(2));
    let worker = WorkerId::new("job", 0);
    let mut aggregator = AccumulatorAggregator::new(
        worker.clone(),
        Arc::clone(&counters),
        store.clone(),
        Duration::from_millis(10),
    );

    counters.add_record(1);
    aggregator.start();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(aggregator.failed_pushes(), 2);
    assert_eq!(store.inner.total(NUM_READ).await, 1);
    aggregator.close().await;
}

#[tokio::test]
async fn test_aggregator_close_performs_final_push() {
    let counters = Arc::new(ReaderCounters::new());
    let store = Arc::new(InMemoryAccumulatorStore::new());
    let worker = WorkerId::new("job", 0);
    let mut aggregator = AccumulatorAggregator::new(
        worker.clone(),
        Arc::clone(&counters),
        store.clone(),
        Duration::from_secs(3600),
    );

    aggregator.start();
    counters.add_record(1);
    counters.add_record(1);
    aggregator.close().await;

    assert!(!aggregator.is_running());
    assert_eq!(store.total(NUM_READ).await, 2);

    // Second close is a no-op
    counters.add_record(1);
    aggregator.close().await;
    assert_eq!(store.total(NUM_READ).await, 2);
}

#[tokio::test]
async fn test_aggregator_close_without_start() {
    let counters = Arc::new(ReaderCounters::new());
    let store = Arc::new(InMemoryAccumulatorStore::new());
    let mut aggregator = AccumulatorAggregator::new(
        WorkerId::default(),
        counters,
        store.clone(),
        Duration::from_secs(1),
    );

    aggregator.close().await;
    assert_eq!(store.total(NUM_READ).await, 0);
    assert!(store.worker(&WorkerId::default()).await.is_some());
}

// ============================================================================
// Reporter Tests
// ============================================================================

#[test]
fn test_render_text_format() {
    let mut values = MetricValues::new();
    values.insert(BYTE_READ.to_string(), 42);
    values.insert(NUM_READ.to_string(), 3);

    assert_eq!(
        render_text_format(&values),
        "# TYPE solidafy_reader_byte_read counter\n\
         solidafy_reader_byte_read 42\n\
         # TYPE solidafy_reader_num_read counter\n\
         solidafy_reader_num_read 3\n"
    );
}

#[tokio::test]
async fn test_push_gateway_report() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/metrics/job/demo/instance/3"))
        .and(body_string_contains("solidafy_reader_num_read 5"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let reporter = PushGatewayReporter::new(&server.uri()).unwrap();
    let worker = WorkerId::new("demo", 3);
    reporter.open(&worker).await.unwrap();
    reporter.report(&worker, &values(5)).await.unwrap();
    // Without delete_on_close, close sends nothing
    reporter.close(&worker).await.unwrap();
}

#[tokio::test]
async fn test_push_gateway_delete_on_close() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/metrics/job/demo/instance/0"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let reporter = PushGatewayReporter::new(&server.uri())
        .unwrap()
        .with_delete_on_close(true);
    reporter.close(&WorkerId::new("demo", 0)).await.unwrap();
}

#[tokio::test]
async fn test_push_gateway_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let reporter = PushGatewayReporter::new(&server.uri()).unwrap();
    let err = reporter
        .report(&WorkerId::default(), &values(1))
        .await
        .unwrap_err();

    match err {
        Error::HttpStatus { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "overloaded");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_push_gateway_group_url_encodes_job_name() {
    let reporter = PushGatewayReporter::new("http://gateway:9091/").unwrap();
    let url = reporter.group_url(&WorkerId::new("nightly sync", 1)).unwrap();
    assert_eq!(
        url.as_str(),
        "http://gateway:9091/metrics/job/nightly%20sync/instance/1"
    );
}

#[test]
fn test_push_gateway_rejects_invalid_url() {
    assert!(PushGatewayReporter::new("not a url").is_err());
}

#[tokio::test]
async fn test_build_reporter_log() {
    let reporter = build_reporter(&ReporterConfig::Log).unwrap();
    reporter
        .report(&WorkerId::default(), &values(1))
        .await
        .unwrap();
}
