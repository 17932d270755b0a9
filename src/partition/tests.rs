//! Tests for partition module

use super::*;
use crate::error::{Error, Result};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use test_case::test_case;

// ============================================================================
// PartitionToken Tests
// ============================================================================

#[test]
fn test_token_bytes_round_trip_all_kinds() {
    for token in [
        PartitionToken::scan(3, vec![1, 2, 3]),
        PartitionToken::empty(0),
        PartitionToken::error(0, "table missing"),
    ] {
        let bytes = token.to_bytes().unwrap();
        assert_eq!(PartitionToken::from_bytes(&bytes).unwrap(), token);
    }
}

#[test]
fn test_token_wire_layout() {
    let value = serde_json::to_value(PartitionToken::scan(1, b"ab".to_vec())).unwrap();
    assert_eq!(value, json!({"index": 1, "kind": "scan", "payload": "YWI="}));

    let value = serde_json::to_value(PartitionToken::empty(0)).unwrap();
    assert_eq!(value, json!({"index": 0, "kind": "empty"}));
}

#[test]
fn test_error_token_raises_planning_error() {
    let token = PartitionToken::error(0, "connection refused");
    assert!(token.is_error());

    match token.ensure_openable() {
        Err(Error::Planning { message }) => assert_eq!(message, "connection refused"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(PartitionToken::empty(0).ensure_openable().is_ok());
}

#[test]
fn test_token_payload() {
    assert_eq!(PartitionToken::scan(0, vec![9]).payload(), Some(&[9u8][..]));
    assert_eq!(PartitionToken::empty(0).payload(), None);
    assert!(PartitionToken::empty(0).is_empty());
}

// ============================================================================
// ScanToken Tests
// ============================================================================

#[test]
fn test_scan_token_for_range() {
    let request = ScanRequest::new("users")
        .with_columns(vec!["id".into()])
        .with_order_by("id")
        .with_page_size(0);
    let token = ScanToken::for_range(&request, 10, 5);

    assert_eq!(token.table, "users");
    assert_eq!(token.projection, vec!["id".to_string()]);
    assert_eq!(token.offset, 10);
    assert_eq!(token.limit, 5);
    assert_eq!(token.page_size, 1);

    let decoded = ScanToken::decode(&token.encode().unwrap()).unwrap();
    assert_eq!(decoded, token);
}

#[test]
fn test_scan_token_resumed_after() {
    let token = ScanToken::for_range(&ScanRequest::new("t"), 100, 50);

    let resumed = token.resumed_after(20);
    assert_eq!((resumed.offset, resumed.limit), (120, 30));

    let past_end = token.resumed_after(80);
    assert_eq!((past_end.offset, past_end.limit), (150, 0));
}

#[test]
fn test_scan_token_decode_malformed() {
    assert!(matches!(
        ScanToken::decode(b"not json"),
        Err(Error::Planning { .. })
    ));
}

// ============================================================================
// Planning Tests
// ============================================================================

struct FixedPlanner(Vec<PartitionToken>);

#[async_trait]
impl PartitionPlanner for FixedPlanner {
    async fn plan(&self, _request: &ScanRequest) -> Result<Vec<PartitionToken>> {
        Ok(self.0.clone())
    }
}

struct FailingPlanner;

#[async_trait]
impl PartitionPlanner for FailingPlanner {
    async fn plan(&self, _request: &ScanRequest) -> Result<Vec<PartitionToken>> {
        Err(Error::connection("master unreachable"))
    }
}

#[tokio::test]
async fn test_plan_partitions_renumbers_tokens() {
    let planner = FixedPlanner(vec![
        PartitionToken::scan(7, vec![1]),
        PartitionToken::scan(7, vec![2]),
    ]);
    let tokens = plan_partitions(&planner, &ScanRequest::new("t")).await;

    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0].index, 0);
    assert_eq!(tokens[1].index, 1);
    assert_eq!(tokens[1].payload(), Some(&[2u8][..]));
}

#[tokio::test]
async fn test_plan_partitions_empty_plan_yields_empty_token() {
    let tokens = plan_partitions(&FixedPlanner(Vec::new()), &ScanRequest::new("t")).await;
    assert_eq!(tokens, vec![PartitionToken::empty(0)]);
}

#[tokio::test]
async fn test_plan_partitions_failure_yields_error_token() {
    let tokens = plan_partitions(&FailingPlanner, &ScanRequest::new("t")).await;

    assert_eq!(tokens.len(), 1);
    let err = tokens[0].ensure_openable().unwrap_err();
    assert!(err.to_string().contains("master unreachable"));
}

#[test_case(10, 3, &[(0, 4), (4, 3), (7, 3)] ; "uneven split")]
#[test_case(4, 4, &[(0, 1), (1, 1), (2, 1), (3, 1)] ; "one row each")]
#[test_case(2, 5, &[(0, 1), (1, 1)] ; "fewer rows than partitions")]
#[test_case(5, 0, &[(0, 5)] ; "zero partitions means one")]
#[test_case(0, 3, &[] ; "no rows")]
fn test_split_range(total: u64, partitions: u32, expected: &[(u64, u64)]) {
    assert_eq!(split_range(total, partitions), expected.to_vec());
}

// ============================================================================
// FilterExpr Tests
// ============================================================================

#[test]
fn test_filter_parse_blank_matches_all() {
    let filter = FilterExpr::parse("  ").unwrap();
    assert!(filter.is_empty());
    assert!(filter.matches(&json!({"any": 1})));
    assert_eq!(filter.to_sql(), None);
}

#[test]
fn test_filter_parse_conditions() {
    let filter = FilterExpr::parse("age >= 18 AND name = 'O''Brien' and deleted IS NULL").unwrap();

    assert_eq!(
        filter,
        FilterExpr::all()
            .with_condition("age", CompareOp::Ge, 18)
            .with_condition("name", CompareOp::Eq, "O'Brien")
            .with_condition("deleted", CompareOp::IsNull, json!(null))
    );
    assert_eq!(
        filter.to_sql().unwrap(),
        "\"age\" >= 18 AND \"name\" = 'O''Brien' AND \"deleted\" IS NULL"
    );
}

#[test_case("a = 1", &json!({"a": 1}), true)]
#[test_case("a <> 1", &json!({"a": 2}), true)]
#[test_case("a < 2.5", &json!({"a": 2}), true)]
#[test_case("a > 'b'", &json!({"a": "c"}), true)]
#[test_case("a = true", &json!({"a": true}), true)]
#[test_case("a = 3", &json!({"a": "3"}), true)]
#[test_case("a IS NOT NULL", &json!({"a": 0}), true)]
#[test_case("a IS NULL", &json!({}), true)]
#[test_case("a = 1", &json!({}), false)]
#[test_case("a != 1", &json!({"a": null}), false)]
#[test_case("a <= 1", &json!({"a": 2}), false)]
#[test_case("name = 'salt and pepper'", &json!({"name": "salt and pepper"}), true)]
#[test_case("name = 'it''s AND more' and a = 1", &json!({"name": "it's AND more", "a": 1}), true)]
#[test_case("name = 'salt and pepper' AND a = 1", &json!({"name": "salt and pepper", "a": 2}), false)]
fn test_filter_matches(filter: &str, row: &serde_json::Value, expected: bool) {
    assert_eq!(FilterExpr::parse(filter).unwrap().matches(row), expected);
}

#[test]
fn test_filter_parse_rejects_garbage() {
    assert!(matches!(
        FilterExpr::parse("id BETWEEN 1"),
        Err(Error::InvalidConfigValue { .. })
    ));
}
