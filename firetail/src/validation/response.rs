//! レスポンス検証
//!
//! コンテントネゴシエーション、期待スキーマの解決、本文の解析、再帰的なスキーマ検証を行う。
//! 結果は観測結果として返し、レスポンスの差し替え判断はパイプラインに任せる。

use crate::contract::types::{SchemaNode, SchemaType};
use crate::pipeline::context::RequestContext;
use crate::validation::format::plain_json_kind;
use crate::validation::types::{
    ErrorDetail, Observation, ACCEPT_HEADER_MISSING, INCORRECT_RESPONSE_CONTENT_TYPE,
    RESPONSE_SANITISATION_FAILED, RESPONSE_VALIDATION_FAILED,
};
use axum::http::{header, response::Parts};
use serde_json::Value;

const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// レスポンスを検証する（空なら妥当）
///
/// 結果に関わらず、元のステータスと本文をコンテキストに記録する。
pub fn validate(
    parts: &Parts,
    body: &str,
    accept: Option<&str>,
    context: &mut RequestContext,
) -> Vec<Observation> {
    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    context.original_status = parts.status.as_u16();
    context.original_body = Some(body.to_string());
    context.response_sanitised = true;

    let Some(operation) = context.operation.clone() else {
        return Vec::new();
    };

    let accept = accept
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| if value == "*/*" { DEFAULT_CONTENT_TYPE } else { value });

    let mut observations = Vec::new();
    match accept {
        None => observations.push(Observation::new(
            0,
            ACCEPT_HEADER_MISSING,
            "The Accept header is missing from the request",
            Vec::new(),
        )),
        Some(accept) if !accepts(accept, &content_type) => {
            observations.push(Observation::new(
                406,
                INCORRECT_RESPONSE_CONTENT_TYPE,
                "Incorrect response format",
                vec![ErrorDetail::new(
                    0,
                    format!(
                        "Response content type {content_type} not found in Accept header: {accept}"
                    ),
                )
                .with_accept(accept)
                .with_content_type(content_type.as_str())],
            ));
            return observations;
        }
        Some(_) => {}
    }

    let Some(Some(schema)) = operation
        .response_for(context.original_status)
        .and_then(|response| response.media_type(&content_type))
    else {
        return observations;
    };

    let parsed: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            observations.push(Observation::new(
                500,
                RESPONSE_SANITISATION_FAILED,
                "Failed to sanitise response",
                vec![ErrorDetail::new(0, e.to_string())
                    .with_accept(accept.unwrap_or_default())
                    .with_content_type(content_type.as_str())],
            ));
            return observations;
        }
    };

    context.response_validated = true;
    let mut details = Vec::new();
    validate_node(schema, &parsed, &context.matched_template, &mut details);
    if !details.is_empty() {
        observations.push(Observation::new(
            500,
            RESPONSE_VALIDATION_FAILED,
            "Failed to validate response",
            details,
        ));
    }

    observations
}

/// Acceptヘッダーがレスポンスのメディアタイプを許容するか
fn accepts(accept: &str, content_type: &str) -> bool {
    accept
        .split(',')
        .filter_map(|entry| entry.split(';').next())
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .any(|entry| {
            entry == "*/*"
                || entry.eq_ignore_ascii_case(content_type)
                || entry.strip_suffix("/*").is_some_and(|major| {
                    content_type
                        .split('/')
                        .next()
                        .is_some_and(|actual| actual.eq_ignore_ascii_case(major))
                })
        })
}

fn validate_node(schema: &SchemaNode, value: &Value, path: &str, details: &mut Vec<ErrorDetail>) {
    if value.is_null() && schema.nullable {
        return;
    }
    match schema.effective_type() {
        Some(SchemaType::Object) => validate_object(schema, value, path, details),
        Some(SchemaType::Array) => validate_array(schema, value, path, details),
        Some(expected) => validate_primitive(expected, value, path, details),
        None => {}
    }
}

fn validate_object(schema: &SchemaNode, value: &Value, path: &str, details: &mut Vec<ErrorDetail>) {
    let Value::Object(map) = value else {
        details.push(ErrorDetail::new(0, format!("{path} should be an object.")));
        return;
    };
    for name in &schema.required {
        if !map.contains_key(name) {
            details.push(ErrorDetail::new(
                0,
                format!("{path}.{name} is required but missing."),
            ));
        }
    }
    for (name, property) in &schema.properties {
        if let Some(child) = map.get(name) {
            validate_node(property, child, &format!("{path}.{name}"), details);
        }
    }
}

fn validate_array(schema: &SchemaNode, value: &Value, path: &str, details: &mut Vec<ErrorDetail>) {
    let Value::Array(elements) = value else {
        details.push(ErrorDetail::new(0, format!("{path} should be an array.")));
        return;
    };
    if let Some(items) = schema.items.as_deref() {
        let element_path = format!("{path}[]");
        for element in elements {
            validate_node(items, element, &element_path, details);
        }
    }
}

fn validate_primitive(
    expected: SchemaType,
    value: &Value,
    path: &str,
    details: &mut Vec<ErrorDetail>,
) {
    let actual = plain_json_kind(value);
    if expected == actual || (expected.is_numeric() && actual.is_numeric()) {
        return;
    }
    details.push(ErrorDetail::new(
        0,
        format!("{path} expected '{expected}', but got '{actual}'."),
    ));
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Response, StatusCode};

    fn context_for(path: &str) -> RequestContext {
        let index = crate::test_utils::sample_index();
        let mut ctx = RequestContext::new("get");
        ctx.bind(index.resolve(path, "get"));
        ctx
    }

    fn response_parts(status: StatusCode, content_type: Option<&str>) -> Parts {
        let mut builder = Response::builder().status(status);
        if let Some(ct) = content_type {
            builder = builder.header(header::CONTENT_TYPE, ct);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_missing_accept_yields_single_observation() {
        let mut ctx = context_for("/instances/abc");
        let parts = response_parts(StatusCode::OK, Some("application/json"));
        let observations = validate(&parts, r#"{"id":"abc","name":"db"}"#, None, &mut ctx);
        assert_eq!(observations.len(), 1);
        assert!(observations[0].kind.ends_with(".accept.header.missing"));
        assert!(!observations[0].is_blocking());
        assert!(ctx.response_sanitised);
        assert_eq!(ctx.original_status, 200);
    }

    #[test]
    fn test_missing_accept_still_validates_body() {
        let mut ctx = context_for("/response-conformance/missing-field");
        let parts = response_parts(StatusCode::OK, Some("application/json"));
        let observations = validate(&parts, r#"{"id":"1","name":"x"}"#, None, &mut ctx);
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].kind, ACCEPT_HEADER_MISSING);
        assert_eq!(observations[1].kind, RESPONSE_VALIDATION_FAILED);
    }

    #[test]
    fn test_malformed_json_yields_sanitisation_failure() {
        let mut ctx = context_for("/response-conformance/malformed-json");
        let parts = response_parts(StatusCode::OK, Some("application/json"));
        let observations = validate(&parts, "{12345", Some("application/json"), &mut ctx);
        assert_eq!(observations.len(), 1);
        assert!(observations[0].kind.ends_with(".sanitisation.failed"));
        assert_eq!(observations[0].status, 500);
        assert!(!observations[0].details[0].message.is_empty());
        assert_eq!(ctx.original_body.as_deref(), Some("{12345"));
    }

    #[test]
    fn test_missing_required_field() {
        let mut ctx = context_for("/response-conformance/missing-field");
        let parts = response_parts(StatusCode::OK, Some("application/json; charset=utf-8"));
        let observations = validate(
            &parts,
            r#"{"id":"1","name":"x","age":"old"}"#,
            Some("*/*"),
            &mut ctx,
        );
        assert_eq!(observations.len(), 1);
        let messages: Vec<_> = observations[0]
            .details
            .iter()
            .map(|d| d.message.as_str())
            .collect();
        assert_eq!(
            messages,
            vec![".response-conformance.missing-field.age expected 'integer', but got 'string'."]
        );

        let observations = validate(&parts, r#"{"id":"1","name":"x"}"#, Some("*/*"), &mut ctx);
        assert_eq!(
            observations[0].details[0].message,
            ".response-conformance.missing-field.age is required but missing."
        );
    }

    #[test]
    fn test_array_elements_are_checked() {
        let mut ctx = context_for("/performance/unbounded-result-set");
        let parts = response_parts(StatusCode::OK, None);
        let observations = validate(
            &parts,
            r#"[{"id":1,"score":0.5},{"score":"high"}]"#,
            Some("application/json"),
            &mut ctx,
        );
        let messages: Vec<_> = observations[0]
            .details
            .iter()
            .map(|d| d.message.as_str())
            .collect();
        assert_eq!(
            messages,
            vec![
                ".performance.unbounded-result-set[].id is required but missing.",
                ".performance.unbounded-result-set[].score expected 'number', but got 'string'.",
            ]
        );

        let observations = validate(&parts, r#"{"id":1}"#, Some("application/json"), &mut ctx);
        assert_eq!(
            observations[0].details[0].message,
            ".performance.unbounded-result-set should be an array."
        );
    }

    #[test]
    fn test_incorrect_content_type_stops_checks() {
        let mut ctx = context_for("/instances/abc");
        let parts = response_parts(StatusCode::OK, Some("text/html"));
        let observations = validate(&parts, "<html/>", Some("application/json"), &mut ctx);
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].status, 406);
        let detail = &observations[0].details[0];
        assert_eq!(detail.accept.as_deref(), Some("application/json"));
        assert_eq!(detail.content_type.as_deref(), Some("text/html"));
    }

    #[test]
    fn test_accept_lists_and_wildcards() {
        assert!(accepts("text/html, application/json;q=0.9", "application/json"));
        assert!(accepts("application/*", "application/json"));
        assert!(accepts("text/html, */*;q=0.1", "application/json"));
        assert!(!accepts("text/html", "application/json"));
    }

    #[test]
    fn test_undeclared_status_is_valid() {
        let mut ctx = context_for("/instances/abc");
        let parts = response_parts(StatusCode::NOT_FOUND, Some("application/json"));
        let observations = validate(&parts, "not json", Some("application/json"), &mut ctx);
        assert!(observations.is_empty());
        assert_eq!(ctx.original_status, 404);
        assert!(!ctx.response_validated);
    }

    #[test]
    fn test_nullable_and_numeric_compatibility() {
        let mut ctx = context_for("/instances/abc");
        let parts = response_parts(StatusCode::OK, Some("application/json"));
        let observations = validate(
            &parts,
            r#"{"id":"a","name":"b","status":null}"#,
            Some("application/json"),
            &mut ctx,
        );
        assert!(observations.is_empty());
        assert!(ctx.response_validated);
    }

    #[test]
    fn test_response_validation_is_deterministic() {
        let parts = response_parts(StatusCode::OK, Some("application/json"));
        let body = r#"{"name":5}"#;
        let mut first_ctx = context_for("/instances/abc");
        let mut second_ctx = context_for("/instances/abc");
        let first = validate(&parts, body, Some("application/json"), &mut first_ctx);
        let second = validate(&parts, body, Some("application/json"), &mut second_ctx);
        assert_eq!(first, second);
        assert_eq!(first[0].details.len(), 2);
    }
}
