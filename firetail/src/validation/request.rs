//! リクエスト検証
//!
//! パラメータ、Content-Type、ボディの順に検証し、エラーを蓄積して返す。
//! ボディが読めない場合（メディアタイプ未宣言、JSON不正、非ASCII）だけはそこで打ち切る。

use crate::contract::types::{
    OperationContract, ParameterContract, ParameterLocation, RequestBodyContract, SchemaNode,
    SchemaType,
};
use crate::pipeline::context::RequestContext;
use crate::validation::format::{
    coerces_to, enum_list, enum_repr, json_kind, matches_format, parse_number, plain_json_kind,
};
use crate::validation::types::ErrorDetail;
use axum::http::{header, request::Parts, HeaderMap};
use serde_json::Value;
use std::collections::HashMap;

const BODY_ROOT: &str = "body";

/// リクエストを検証する（空なら妥当）
pub fn validate(parts: &Parts, body: &str, context: &RequestContext) -> Vec<ErrorDetail> {
    let Some(operation) = context.operation.as_deref() else {
        return Vec::new();
    };
    let mut errors = Vec::new();

    if !operation.parameters.is_empty() {
        validate_parameters(operation, parts, context, &mut errors);
    }

    if let Some(request_body) = &operation.request_body {
        let content_type = header_text(&parts.headers, header::CONTENT_TYPE.as_str());
        validate_content_type(request_body, content_type.as_deref(), &mut errors);
        let content_length = declared_content_length(&parts.headers).unwrap_or(body.len());
        if content_length > 0 && !request_body.content.is_empty() {
            validate_body(request_body, content_type.as_deref(), body, &mut errors);
        }
    }

    errors
}

fn validate_parameters(
    operation: &OperationContract,
    parts: &Parts,
    context: &RequestContext,
    errors: &mut Vec<ErrorDetail>,
) {
    let query = query_pairs(parts.uri.query());
    let cookies = cookie_pairs(&parts.headers);

    for param in &operation.parameters {
        let value = match param.location {
            ParameterLocation::Path => context.path_parameters.get(&param.name).cloned(),
            ParameterLocation::Query => query
                .iter()
                .find(|(name, _)| *name == param.name)
                .map(|(_, value)| value.clone()),
            ParameterLocation::Header => header_text(&parts.headers, &param.name),
            ParameterLocation::Cookie => cookies.get(param.name.as_str()).cloned(),
        };

        match value {
            Some(value) => validate_parameter_value(param, &value, errors),
            None if param.required => errors.push(ErrorDetail::bad_request(format!(
                "Missing {} parameter: {}",
                param.location, param.name
            ))),
            None => {}
        }
    }
}

fn validate_parameter_value(param: &ParameterContract, value: &str, errors: &mut Vec<ErrorDetail>) {
    let Some(schema) = &param.schema else {
        return;
    };
    let location = param.location;
    let name = &param.name;

    if !coerces_to(value, schema.schema_type) {
        let expected = schema.schema_type.map(|t| t.as_str()).unwrap_or("value");
        errors.push(ErrorDetail::bad_request(format!(
            "Invalid {location} parameter type for '{name}'. Expected {expected}."
        )));
        return;
    }

    if !schema.enum_values.is_empty()
        && !schema.enum_values.iter().any(|allowed| enum_repr(allowed) == value)
    {
        errors.push(ErrorDetail::bad_request(format!(
            "{location} parameter '{name}' must be one of: {}",
            enum_list(&schema.enum_values)
        )));
    }

    if let Some(pattern) = &schema.pattern {
        if !pattern.is_match(value) {
            errors.push(ErrorDetail::bad_request(format!(
                "{location} parameter '{name}' does not match required pattern: {}",
                pattern.as_str()
            )));
        }
    }

    if let Some(number) = parse_number(value) {
        if let Some(minimum) = schema.minimum.filter(|min| number < *min) {
            errors.push(ErrorDetail::bad_request(format!(
                "{location} parameter '{name}' must be greater than or equal to {minimum}"
            )));
        }
        if let Some(maximum) = schema.maximum.filter(|max| number > *max) {
            errors.push(ErrorDetail::bad_request(format!(
                "{location} parameter '{name}' must be less than or equal to {maximum}"
            )));
        }
    }

    if let Some(format) = schema.format.as_deref() {
        if !matches_format(value, format) {
            errors.push(ErrorDetail::bad_request(format!(
                "{location} parameter '{name}' must be a valid {format}"
            )));
        }
    }
}

fn validate_content_type(
    request_body: &RequestBodyContract,
    content_type: Option<&str>,
    errors: &mut Vec<ErrorDetail>,
) {
    let declared = request_body.media_types();
    match content_type.filter(|ct| !ct.is_empty()) {
        Some(ct) if declared.iter().any(|media_type| ct.contains(*media_type)) => {}
        _ => errors.push(ErrorDetail::new(
            415,
            format!("Invalid Content-Type. Expected one of: {}", declared.join(", ")),
        )),
    }
}

fn validate_body(
    request_body: &RequestBodyContract,
    content_type: Option<&str>,
    body: &str,
    errors: &mut Vec<ErrorDetail>,
) {
    let media_type = content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .unwrap_or_default();
    let Some(schema) = request_body.media_type(media_type) else {
        errors.push(ErrorDetail::new(
            415,
            format!("Unsupported content type: {media_type}"),
        ));
        return;
    };
    if !is_json_media_type(media_type) {
        return;
    }

    let parsed: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => {
            errors.push(ErrorDetail::bad_request("Malformed JSON in request body."));
            return;
        }
    };

    if !body.is_ascii() {
        errors.push(ErrorDetail::new(
            500,
            "Unicode handling error in request body.",
        ));
        return;
    }

    // ルートは宣言された型に関係なくオブジェクトでなければならない
    validate_object(schema.as_ref(), &parsed, BODY_ROOT, errors);
}

fn validate_object(
    schema: Option<&SchemaNode>,
    value: &Value,
    path: &str,
    errors: &mut Vec<ErrorDetail>,
) {
    let Value::Object(map) = value else {
        errors.push(ErrorDetail::bad_request(format!(
            "Expected object at {path}, but got {}",
            plain_json_kind(value)
        )));
        return;
    };
    let Some(schema) = schema else {
        return;
    };

    for name in &schema.required {
        if !map.contains_key(name) {
            errors.push(ErrorDetail::bad_request(format!(
                "Missing required property: {path}.{name}"
            )));
        }
    }

    for (name, property) in &schema.properties {
        if let Some(child) = map.get(name) {
            validate_property(property, child, &format!("{path}.{name}"), errors);
        }
    }

    if !schema.additional_properties_allowed {
        for name in map.keys() {
            if !schema.declares_property(name) {
                errors.push(ErrorDetail::bad_request(format!(
                    "Unexpected property '{name}' found in {path}"
                )));
            }
        }
    }
}

fn validate_property(schema: &SchemaNode, value: &Value, path: &str, errors: &mut Vec<ErrorDetail>) {
    if value.is_null() && schema.nullable {
        return;
    }

    if let Some(expected) = schema.schema_type {
        let actual = json_kind(value, schema);
        if expected != actual {
            errors.push(ErrorDetail::bad_request(format!(
                "Invalid type for {path}. Expected '{expected}', got '{actual}'"
            )));
            return;
        }
    }

    if !schema.enum_values.is_empty() {
        let actual = enum_repr(value);
        if !schema.enum_values.iter().any(|allowed| enum_repr(allowed) == actual) {
            errors.push(ErrorDetail::bad_request(format!(
                "Invalid value for {path}. Expected one of: {}",
                enum_list(&schema.enum_values)
            )));
        }
    }

    if let Value::String(text) = value {
        if let Some(pattern) = schema.pattern.as_ref().filter(|p| !p.is_match(text)) {
            errors.push(ErrorDetail::bad_request(format!(
                "Value of {path} does not match pattern {}",
                pattern.as_str()
            )));
        }
        if let Some(format) = schema.format.as_deref().filter(|f| !matches_format(text, f)) {
            errors.push(ErrorDetail::bad_request(format!(
                "Value of {path} must be a valid {format}"
            )));
        }
    }

    if let Some(number) = value.as_f64() {
        if let Some(minimum) = schema.minimum.filter(|min| number < *min) {
            errors.push(ErrorDetail::bad_request(format!(
                "Value of {path} must be greater than or equal to {minimum}"
            )));
        }
        if let Some(maximum) = schema.maximum.filter(|max| number > *max) {
            errors.push(ErrorDetail::bad_request(format!(
                "Value of {path} must be less than or equal to {maximum}"
            )));
        }
    }

    match (schema.effective_type(), value) {
        (Some(SchemaType::Object), Value::Object(_)) => {
            validate_object(Some(schema), value, path, errors)
        }
        (Some(SchemaType::Array), Value::Array(elements)) => {
            if let Some(items) = schema.items.as_deref() {
                for (position, element) in elements.iter().enumerate() {
                    validate_property(items, element, &format!("{path}[{position}]"), errors);
                }
            }
        }
        _ => {}
    }
}

fn is_json_media_type(media_type: &str) -> bool {
    let media_type = media_type.to_ascii_lowercase();
    media_type == "application/json" || media_type.ends_with("+json")
}

/// 同名ヘッダーを `,` で連結した値
pub(crate) fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(","))
    }
}

fn declared_content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

fn query_pairs(query: Option<&str>) -> Vec<(String, String)> {
    query
        .and_then(|q| serde_urlencoded::from_str::<Vec<(String, String)>>(q).ok())
        .unwrap_or_default()
}

fn cookie_pairs(headers: &HeaderMap) -> HashMap<&str, String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .map(|(name, value)| (name.trim(), value.trim().to_string()))
        .fold(HashMap::new(), |mut cookies, (name, value)| {
            cookies.entry(name).or_insert(value);
            cookies
        })
}
