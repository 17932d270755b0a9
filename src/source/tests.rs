//! Tests for source module

use super::*;
use crate::error::Error;
use crate::partition::{FilterExpr, ScanRequest};
use crate::record::{ColumnSpec, ColumnType, FieldValue};
use pretty_assertions::assert_eq;
use serde_json::json;

fn users(count: i64) -> Vec<serde_json::Value> {
    (0..count)
        .map(|id| json!({"id": id, "name": format!("user-{id}"), "region": "raw"}))
        .collect()
}

fn columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("id", ColumnType::Int64),
        ColumnSpec::new("name", ColumnType::String),
        ColumnSpec::constant("region", ColumnType::String, "eu"),
    ]
}

fn source(client: MemoryTableClient) -> ScanSource<MemoryTableClient> {
    let request = ScanRequest::new("users").with_order_by("id").with_page_size(3);
    ScanSource::new(client, request, columns()).unwrap()
}

async fn read_all(source: &mut ScanSource<MemoryTableClient>) -> Vec<Fetched> {
    let mut out = Vec::new();
    loop {
        match source.fetch_next().await.unwrap() {
            Fetched::End => return out,
            other => out.push(other),
        }
    }
}

fn ids(fetched: &[Fetched]) -> Vec<i64> {
    fetched
        .iter()
        .filter_map(|f| match f {
            Fetched::Record(record) => match record.get(0) {
                Some(FieldValue::Int64(id)) => Some(*id),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

// ============================================================================
// Planning Tests
// ============================================================================

#[test]
fn test_projection_defaults_to_source_columns() {
    let source = source(MemoryTableClient::new());
    assert_eq!(source.request().columns, vec!["id", "name"]);
}

#[tokio::test]
async fn test_plan_splits_rows() {
    let source = source(MemoryTableClient::new().with_table("users", users(10)));
    let tokens = source.plan_partitions(3).await;

    assert_eq!(tokens.len(), 3);
    for (i, token) in tokens.iter().enumerate() {
        assert_eq!(token.index, i as u32);
        assert!(token.payload().is_some());
    }
}

#[tokio::test]
async fn test_plan_zero_matching_rows_yields_empty_token() {
    let client = MemoryTableClient::new().with_table("users", users(5));
    let request = ScanRequest::new("users").with_filter(FilterExpr::parse("id > 100").unwrap());
    let mut source = ScanSource::new(client, request, columns()).unwrap();

    let tokens = source.plan_partitions(4).await;
    assert_eq!(tokens.len(), 1);
    assert!(tokens[0].is_empty());

    source.open_partition(&tokens[0], None).await.unwrap();
    assert_eq!(source.fetch_next().await.unwrap(), Fetched::End);
}

#[tokio::test]
async fn test_plan_failure_deferred_to_open() {
    let mut source = source(MemoryTableClient::new());
    let tokens = source.plan_partitions(2).await;

    assert_eq!(tokens.len(), 1);
    assert!(tokens[0].is_error());
    match source.open_partition(&tokens[0], None).await {
        Err(Error::Planning { message }) => assert!(message.contains("users")),
        other => panic!("unexpected result: {other:?}"),
    }
}

// ============================================================================
// Read Tests
// ============================================================================

#[tokio::test]
async fn test_partitions_cover_every_row_once() {
    let client = MemoryTableClient::new().with_table("users", users(10));
    let planner = source(client.clone());
    let tokens = planner.plan_partitions(3).await;

    let mut seen = Vec::new();
    for token in &tokens {
        let mut reader = source(client.clone());
        reader.open_job().await.unwrap();
        reader.open_partition(token, None).await.unwrap();
        seen.extend(ids(&read_all(&mut reader).await));
        reader.close_partition().await.unwrap();
        reader.close_job().await.unwrap();
    }

    assert_eq!(seen, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_constant_column_overrides_source() {
    let client = MemoryTableClient::new().with_table("users", users(4));
    let mut reader = source(client);
    let tokens = reader.plan_partitions(1).await;
    reader.open_partition(&tokens[0], None).await.unwrap();

    for fetched in read_all(&mut reader).await {
        let Fetched::Record(record) = fetched else {
            panic!("expected record");
        };
        assert_eq!(record.get(2), Some(&FieldValue::String("eu".into())));
    }
}

#[tokio::test]
async fn test_bad_row_is_row_error() {
    let rows = vec![json!({"id": 1, "name": "a"}), json!({"id": "oops", "name": "b"})];
    let mut reader = source(MemoryTableClient::new().with_table("users", rows));
    let tokens = reader.plan_partitions(1).await;
    reader.open_partition(&tokens[0], None).await.unwrap();

    let fetched = read_all(&mut reader).await;
    assert_eq!(fetched.len(), 2);
    match &fetched[1] {
        Fetched::RowError(e) => assert_eq!(e.raw_row, json!({"id": "oops", "name": "b"})),
        other => panic!("expected row error, got {other:?}"),
    }
    assert_eq!(reader.resume_token(), Some(2u64.to_le_bytes().to_vec()));
}

#[tokio::test]
async fn test_resume_skips_consumed_rows() {
    let client = MemoryTableClient::new().with_table("users", users(7));
    let mut first = source(client.clone());
    let tokens = first.plan_partitions(1).await;

    assert_eq!(first.resume_token(), None);
    first.open_partition(&tokens[0], None).await.unwrap();
    assert_eq!(first.resume_token(), Some(0u64.to_le_bytes().to_vec()));
    first.fetch_next().await.unwrap();
    first.fetch_next().await.unwrap();
    let resume = first.resume_token().unwrap();

    let mut second = source(client);
    second.open_partition(&tokens[0], Some(&resume)).await.unwrap();
    assert_eq!(ids(&read_all(&mut second).await), vec![2, 3, 4, 5, 6]);
    assert_eq!(second.resume_token(), Some(7u64.to_le_bytes().to_vec()));
}

#[tokio::test]
async fn test_invalid_resume_token() {
    let mut reader = source(MemoryTableClient::new().with_table("users", users(2)));
    let tokens = reader.plan_partitions(1).await;

    assert!(matches!(
        reader.open_partition(&tokens[0], Some(&[1, 2, 3])).await,
        Err(Error::State { .. })
    ));
}

#[tokio::test]
async fn test_connection_failure_at_open_job() {
    let client = MemoryTableClient::new().with_table("users", users(2));
    client.fail_next_connections(1);
    let mut reader = source(client);

    assert!(matches!(
        reader.open_job().await,
        Err(Error::Connection { .. })
    ));
    // Next attempt succeeds
    reader.open_job().await.unwrap();
}

#[tokio::test]
async fn test_fetch_failure_propagates() {
    let client = MemoryTableClient::new().with_table("users", users(5));
    let mut reader = source(client.clone());
    let tokens = reader.plan_partitions(1).await;
    reader.open_partition(&tokens[0], None).await.unwrap();

    client.fail_next_fetches(1);
    assert!(matches!(
        reader.fetch_next().await,
        Err(Error::Scan { .. })
    ));
}

#[tokio::test]
async fn test_memory_client_projection_and_paging() {
    let client = MemoryTableClient::new().with_table("users", users(5));
    let scan = crate::partition::ScanToken::for_range(
        &ScanRequest::new("users")
            .with_columns(vec!["id".into()])
            .with_order_by("id")
            .with_page_size(2),
        1,
        3,
    );

    let mut cursor = client.execute_scan(&(), &scan).await.unwrap();
    let mut rows = Vec::new();
    while cursor.has_more().await.unwrap() {
        rows.push(cursor.next().unwrap());
    }

    assert_eq!(rows, vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]);
    assert_eq!(cursor.pages_fetched(), 2);
}
