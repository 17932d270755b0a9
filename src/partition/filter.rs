//! Scan filter expressions
//!
//! A small conjunctive filter language: `col op literal [AND ...]`, with
//! the comparison operators `= != <> < <= > >=` and `IS [NOT] NULL`.
//! Filters can be evaluated against JSON rows or rendered as SQL for
//! pushdown.

use crate::error::{Error, Result};
use crate::types::JsonValue;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

static AND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+and\s+").expect("valid regex"));

static NULL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([A-Za-z_][A-Za-z0-9_]*)\s+is\s+(not\s+)?null\s*$").expect("valid regex")
});

static COMPARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*(<=|>=|<>|!=|=|<|>)\s*(.+?)\s*$")
        .expect("valid regex")
});

/// Comparison operator of a filter condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    IsNull,
    IsNotNull,
}

impl CompareOp {
    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(Self::Eq),
            "!=" | "<>" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }
}

/// A single `column op value` condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub op: CompareOp,
    #[serde(default)]
    pub value: JsonValue,
}

impl Condition {
    /// Evaluate against one row; a missing column is treated as null
    pub fn matches(&self, row: &JsonValue) -> bool {
        let actual = row.get(&self.column).unwrap_or(&JsonValue::Null);
        match self.op {
            CompareOp::IsNull => actual.is_null(),
            CompareOp::IsNotNull => !actual.is_null(),
            op => match compare_values(actual, &self.value) {
                Some(ordering) => match op {
                    CompareOp::Eq => ordering == Ordering::Equal,
                    CompareOp::Ne => ordering != Ordering::Equal,
                    CompareOp::Lt => ordering == Ordering::Less,
                    CompareOp::Le => ordering != Ordering::Greater,
                    CompareOp::Gt => ordering == Ordering::Greater,
                    CompareOp::Ge => ordering != Ordering::Less,
                    CompareOp::IsNull | CompareOp::IsNotNull => false,
                },
                // Null or incomparable operands never match
                None => false,
            },
        }
    }

    fn to_sql(&self) -> String {
        let column = quote_identifier(&self.column);
        match self.op {
            CompareOp::IsNull | CompareOp::IsNotNull => format!("{column} {}", self.op.symbol()),
            op => format!("{column} {} {}", op.symbol(), sql_literal(&self.value)),
        }
    }
}

/// Conjunction of conditions; empty matches every row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterExpr {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl FilterExpr {
    /// Filter matching every row
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse a filter string; blank input matches every row
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Self::all());
        }

        let conditions = split_conjunction(input)
            .into_iter()
            .map(parse_condition)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { conditions })
    }

    /// Add a condition
    #[must_use]
    pub fn with_condition(
        mut self,
        column: impl Into<String>,
        op: CompareOp,
        value: impl Into<JsonValue>,
    ) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// Check if the filter has no conditions
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate against one row
    pub fn matches(&self, row: &JsonValue) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }

    /// Render as a SQL `WHERE` body, `None` when empty
    pub fn to_sql(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let terms: Vec<String> = self.conditions.iter().map(Condition::to_sql).collect();
        Some(terms.join(" AND "))
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_sql().as_deref().unwrap_or("TRUE"))
    }
}

/// Split on `AND` outside quoted literals
///
/// A literal's `''` escape leaves the quote count even, so counting quotes
/// before a match is enough to tell whether it sits inside a literal.
fn split_conjunction(input: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let mut start = 0;
    for found in AND_RE.find_iter(input) {
        let quotes = input[..found.start()].matches('\'').count();
        if quotes % 2 == 0 {
            terms.push(&input[start..found.start()]);
            start = found.end();
        }
    }
    terms.push(&input[start..]);
    terms
}

fn parse_condition(term: &str) -> Result<Condition> {
    if let Some(caps) = NULL_RE.captures(term) {
        let op = if caps.get(2).is_some() {
            CompareOp::IsNotNull
        } else {
            CompareOp::IsNull
        };
        return Ok(Condition {
            column: caps[1].to_string(),
            op,
            value: JsonValue::Null,
        });
    }

    let caps = COMPARE_RE
        .captures(term)
        .ok_or_else(|| Error::invalid_value("filter", format!("cannot parse '{}'", term.trim())))?;
    let op = CompareOp::from_symbol(&caps[2])
        .ok_or_else(|| Error::invalid_value("filter", format!("unknown operator '{}'", &caps[2])))?;

    Ok(Condition {
        column: caps[1].to_string(),
        op,
        value: parse_literal(&caps[3]),
    })
}

fn parse_literal(raw: &str) -> JsonValue {
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return JsonValue::String(raw[1..raw.len() - 1].replace("''", "'"));
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" => return JsonValue::Bool(true),
        "false" => return JsonValue::Bool(false),
        "null" => return JsonValue::Null,
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return JsonValue::from(i);
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        return JsonValue::Number(n);
    }
    JsonValue::String(raw.to_string())
}

fn compare_values(left: &JsonValue, right: &JsonValue) -> Option<Ordering> {
    match (left, right) {
        (JsonValue::Number(a), JsonValue::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (JsonValue::String(a), JsonValue::String(b)) => Some(a.cmp(b)),
        (JsonValue::Bool(a), JsonValue::Bool(b)) => Some(a.cmp(b)),
        (JsonValue::Number(a), JsonValue::String(b)) => {
            a.as_f64()?.partial_cmp(&b.trim().parse::<f64>().ok()?)
        }
        (JsonValue::String(a), JsonValue::Number(b)) => {
            a.trim().parse::<f64>().ok()?.partial_cmp(&b.as_f64()?)
        }
        _ => None,
    }
}

/// Double-quote a SQL identifier
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_literal(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(true) => "TRUE".to_string(),
        JsonValue::Bool(false) => "FALSE".to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}
