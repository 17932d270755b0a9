//! Tests for record module

use super::*;
use bigdecimal::BigDecimal;
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::str::FromStr;
use test_case::test_case;

// ============================================================================
// ColumnType Tests
// ============================================================================

#[test_case("boolean", ColumnType::Boolean)]
#[test_case("BOOL", ColumnType::Boolean)]
#[test_case("tinyint", ColumnType::Int8)]
#[test_case("smallint", ColumnType::Int16)]
#[test_case("int", ColumnType::Int32)]
#[test_case("bigint", ColumnType::Int64)]
#[test_case("float", ColumnType::Float)]
#[test_case("double", ColumnType::Double)]
#[test_case("decimal", ColumnType::Decimal)]
#[test_case("unixtime_micros", ColumnType::Timestamp)]
#[test_case("varchar", ColumnType::String)]
fn test_column_type_parse(input: &str, expected: ColumnType) {
    assert_eq!(input.parse::<ColumnType>().unwrap(), expected);
}

#[test]
fn test_column_type_parse_unknown() {
    assert!("geometry".parse::<ColumnType>().is_err());
}

#[test]
fn test_column_spec_deserialize() {
    let yaml = r"
- name: id
  type: bigint
- name: source
  type: string
  value: kudu
";
    let columns: Vec<ColumnSpec> = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(columns[0], ColumnSpec::new("id", ColumnType::Int64));
    assert_eq!(
        columns[1],
        ColumnSpec::constant("source", ColumnType::String, "kudu")
    );
    assert!(columns[1].is_constant());
}

// ============================================================================
// FieldValue Tests
// ============================================================================

#[test]
fn test_field_from_json_integers() {
    assert_eq!(
        FieldValue::from_json(&json!(7), ColumnType::Int8).unwrap(),
        FieldValue::Int8(7)
    );
    assert_eq!(
        FieldValue::from_json(&json!("42"), ColumnType::Int32).unwrap(),
        FieldValue::Int32(42)
    );
    assert!(FieldValue::from_json(&json!(300), ColumnType::Int8).is_err());
    assert!(FieldValue::from_json(&json!("abc"), ColumnType::Int64).is_err());
}

#[test]
fn test_field_from_json_null_for_any_type() {
    for ty in [ColumnType::Int32, ColumnType::String, ColumnType::Timestamp] {
        assert_eq!(
            FieldValue::from_json(&json!(null), ty).unwrap(),
            FieldValue::Null
        );
    }
}

#[test]
fn test_field_from_json_decimal() {
    assert_eq!(
        FieldValue::from_json(&json!("12.50"), ColumnType::Decimal).unwrap(),
        FieldValue::Decimal(BigDecimal::from_str("12.50").unwrap())
    );
}

#[test]
fn test_field_from_json_timestamp() {
    let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    assert_eq!(
        FieldValue::from_json(&json!("2024-01-02T03:04:05Z"), ColumnType::Timestamp).unwrap(),
        FieldValue::Timestamp(expected)
    );
    assert_eq!(
        FieldValue::from_json(&json!("2024-01-02 03:04:05"), ColumnType::Timestamp).unwrap(),
        FieldValue::Timestamp(expected)
    );
    assert_eq!(
        FieldValue::from_json(&json!(expected.timestamp_micros()), ColumnType::Timestamp)
            .unwrap(),
        FieldValue::Timestamp(expected)
    );
}

#[test]
fn test_field_string_accepts_scalars() {
    assert_eq!(
        FieldValue::from_json(&json!(5), ColumnType::String).unwrap(),
        FieldValue::String("5".to_string())
    );
}

#[test]
fn test_field_estimated_size() {
    assert_eq!(FieldValue::Int64(1).estimated_size(), 8);
    assert_eq!(FieldValue::String("abcd".into()).estimated_size(), 4);
    assert_eq!(FieldValue::Null.estimated_size(), 0);
}

// ============================================================================
// Converter Tests
// ============================================================================

fn columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("id", ColumnType::Int64),
        ColumnSpec::new("name", ColumnType::String),
        ColumnSpec::constant("region", ColumnType::String, "eu-west"),
    ]
}

#[test]
fn test_converter_reads_source_columns() {
    let converter = JsonRowConverter::new(columns()).unwrap();
    let record = converter
        .convert(&json!({"id": 1, "name": "alice"}))
        .unwrap();

    assert_eq!(record.len(), 3);
    assert_eq!(record.get(0), Some(&FieldValue::Int64(1)));
    assert_eq!(record.get(1), Some(&FieldValue::String("alice".into())));
    assert_eq!(
        record.to_json(converter.columns()),
        json!({"id": 1, "name": "alice", "region": "eu-west"})
    );
}

#[test]
fn test_converter_constant_ignores_source_value() {
    let converter = JsonRowConverter::new(columns()).unwrap();

    for row in [
        json!({"id": 1, "name": "a", "region": "us-east"}),
        json!({"id": 2, "name": "b", "region": null}),
        json!({"id": 3, "name": "c"}),
    ] {
        let record = converter.convert(&row).unwrap();
        assert_eq!(record.get(2), Some(&FieldValue::String("eu-west".into())));
    }
}

#[test]
fn test_converter_source_columns_exclude_constants() {
    let converter = JsonRowConverter::new(columns()).unwrap();
    assert_eq!(converter.source_columns(), vec!["id", "name"]);
}

#[test]
fn test_converter_rejects_bad_constant() {
    let result = JsonRowConverter::new(vec![ColumnSpec::constant(
        "n",
        ColumnType::Int32,
        "not-a-number",
    )]);
    assert!(matches!(
        result,
        Err(crate::Error::InvalidConfigValue { .. })
    ));
}

#[test]
fn test_converter_row_error_carries_raw_row() {
    let converter = JsonRowConverter::new(columns()).unwrap();
    let row = json!({"id": "x1", "name": "bob"});

    let err = converter.convert(&row).unwrap_err();
    assert_eq!(err.raw_row, row);
    assert_eq!(err.column.as_deref(), Some("id"));
    assert!(err.message.contains("not an integer"));
}

#[test]
fn test_converter_missing_column() {
    let converter = JsonRowConverter::new(columns()).unwrap();
    let err = converter.convert(&json!({"id": 1})).unwrap_err();
    assert_eq!(err.column.as_deref(), Some("name"));
}

#[test]
fn test_converter_non_object_row() {
    let converter = JsonRowConverter::new(columns()).unwrap();
    let err = converter.convert(&json!([1, 2])).unwrap_err();
    assert!(err.column.is_none());
}
