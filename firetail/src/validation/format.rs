//! 値レベルのチェック（format、パラメータ型、enum表記）
//!
//! リクエスト検証とレスポンス検証の両方から使う。

use crate::contract::types::{SchemaNode, SchemaType};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static email regex"));

const NAIVE_DATE_TIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// `format` に適合するか（未知のformatは常に適合）
pub fn matches_format(value: &str, format: &str) -> bool {
    match format {
        "email" => EMAIL.is_match(value),
        "uuid" => uuid::Uuid::parse_str(value).is_ok(),
        "date-time" => is_date_time(value),
        _ => true,
    }
}

fn is_date_time(value: &str) -> bool {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value).is_ok()
        || DateTime::parse_from_rfc2822(value).is_ok()
        || NAIVE_DATE_TIME_FORMATS
            .iter()
            .any(|fmt| NaiveDateTime::parse_from_str(value, fmt).is_ok())
        || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

/// 文字列値が宣言された型に変換可能か
///
/// 型未宣言、string、object、arrayは常に変換可能とみなす。
pub fn coerces_to(value: &str, schema_type: Option<SchemaType>) -> bool {
    match schema_type {
        Some(SchemaType::Integer) => value.trim().parse::<i32>().is_ok(),
        Some(SchemaType::Number) => parse_number(value).is_some(),
        Some(SchemaType::Boolean) => {
            value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false")
        }
        Some(SchemaType::Null) => value.is_empty(),
        Some(SchemaType::String) | Some(SchemaType::Object) | Some(SchemaType::Array) | None => {
            true
        }
    }
}

/// 有限の数値として解釈
pub fn parse_number(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
}

/// enum値の表示用文字列（文字列は引用符なし）
pub fn enum_repr(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// enum値をカンマ区切りで連結
pub fn enum_list(values: &[Value]) -> String {
    values.iter().map(enum_repr).collect::<Vec<_>>().join(", ")
}

/// JSON値の型名
///
/// 数値は `schema` の format が int32/int64 のときだけ integer になる。
pub fn json_kind(value: &Value, schema: &SchemaNode) -> SchemaType {
    match value {
        Value::String(_) => SchemaType::String,
        Value::Number(_) => schema.numeric_kind(),
        Value::Bool(_) => SchemaType::Boolean,
        Value::Array(_) => SchemaType::Array,
        Value::Object(_) => SchemaType::Object,
        Value::Null => SchemaType::Null,
    }
}

/// スキーマを参照しないJSON値の型名
pub fn plain_json_kind(value: &Value) -> SchemaType {
    match value {
        Value::String(_) => SchemaType::String,
        Value::Number(n) if n.is_i64() || n.is_u64() => SchemaType::Integer,
        Value::Number(_) => SchemaType::Number,
        Value::Bool(_) => SchemaType::Boolean,
        Value::Array(_) => SchemaType::Array,
        Value::Object(_) => SchemaType::Object,
        Value::Null => SchemaType::Null,
    }
}
