//! OpenAPIドキュメントローダー
//!
//! JSON/YAMLのOpenAPI 3.xドキュメントを [`Contract`] に変換する。
//! 変換中に見つかった問題は [`Diagnostics`] に蓄積し、呼び出し側が起動可否を判断する。

use crate::contract::types::{
    Contract, ContentMap, OperationContract, ParameterContract, ParameterLocation,
    PathItemContract, RequestBodyContract, ResponseContract, SchemaNode, SchemaPattern,
    SchemaType,
};
use crate::error::{FiretailError, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// OpenAPIで定義されるオペレーションのメソッド
const OPERATION_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// `$ref` の最大追跡段数
const MAX_REF_HOPS: usize = 32;

/// パスアイテム拡張: 監査ログで秘匿するヘッダー
pub const SENSITIVE_HEADERS_EXTENSION: &str = "x-ft-sensitive-headers";

/// 読み込み診断
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    /// 起動を拒否すべきエラー
    pub errors: Vec<String>,
    /// 動作に影響しない警告
    pub warnings: Vec<String>,
    /// `openapi` フィールドの値
    pub specification_version: Option<String>,
}

impl Diagnostics {
    /// エラーがないか
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// エラーがあれば [`FiretailError::ContractDiagnostics`] に変換
    pub fn into_result(self) -> Result<Self> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(FiretailError::ContractDiagnostics(self.errors))
        }
    }
}

/// コントラクトローダー
///
/// ファイルパスからコントラクトと診断を返す。別のパーサーを使う場合はこのトレイトを実装する。
pub trait ContractLoader: Send + Sync {
    /// ファイルを読み込みコントラクトに変換する
    fn load(&self, path: &Path) -> Result<(Contract, Diagnostics)>;
}

/// 組み込みのOpenAPI 3.xローダー
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenApiLoader;

impl ContractLoader for OpenApiLoader {
    fn load(&self, path: &Path) -> Result<(Contract, Diagnostics)> {
        let text = std::fs::read_to_string(path).map_err(|source| FiretailError::ContractIo {
            path: path.display().to_string(),
            source,
        })?;
        let (contract, diagnostics) = Self::parse_str(&text)?;
        debug!(
            path = %path.display(),
            paths = contract.paths.len(),
            operations = contract.operation_count(),
            errors = diagnostics.errors.len(),
            "Loaded contract document"
        );
        Ok((contract, diagnostics))
    }
}

impl OpenApiLoader {
    /// JSONまたはYAML文字列から読み込む
    pub fn parse_str(text: &str) -> Result<(Contract, Diagnostics)> {
        let document: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(json_err) => serde_yaml::from_str(text).map_err(|yaml_err| {
                FiretailError::ContractParse(format!(
                    "not valid JSON ({json_err}) nor YAML ({yaml_err})"
                ))
            })?,
        };
        Ok(Self::from_value(&document))
    }

    /// パース済みドキュメントから読み込む
    pub fn from_value(document: &Value) -> (Contract, Diagnostics) {
        DocumentWalker::new(document).walk()
    }
}

/// `servers[0].url` からベースパスを導出する（`/` は空扱い）
pub fn base_path_from_server_url(url: &str) -> String {
    let path = match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) if url.starts_with('/') => url.to_string(),
        Err(_) => String::new(),
    };
    path.trim_end_matches('/').to_string()
}

struct DocumentWalker<'a> {
    root: &'a Value,
    diagnostics: Diagnostics,
}

impl<'a> DocumentWalker<'a> {
    fn new(root: &'a Value) -> Self {
        Self {
            root,
            diagnostics: Diagnostics::default(),
        }
    }

    fn walk(mut self) -> (Contract, Diagnostics) {
        let root = self.root;
        let version = root
            .get("openapi")
            .and_then(Value::as_str)
            .map(str::to_string);
        match version.as_deref() {
            None => self
                .diagnostics
                .errors
                .push("Missing 'openapi' version field".to_string()),
            Some(v) if !v.starts_with("3.") => self
                .diagnostics
                .errors
                .push(format!("Unsupported OpenAPI version: {v}")),
            Some(_) => {}
        }
        self.diagnostics.specification_version = version.clone();

        let base_path = root
            .pointer("/servers/0/url")
            .and_then(Value::as_str)
            .map(base_path_from_server_url)
            .unwrap_or_default();

        let mut paths = Vec::new();
        match root.get("paths").and_then(Value::as_object) {
            Some(entries) => {
                for (template, item) in entries {
                    if let Some(path_item) = self.path_item(template, item) {
                        paths.push(Arc::new(path_item));
                    }
                }
            }
            None => self
                .diagnostics
                .errors
                .push("Document has no 'paths' object".to_string()),
        }

        let contract = Contract {
            openapi_version: version.unwrap_or_default(),
            base_path,
            paths,
        };
        (contract, self.diagnostics)
    }

    fn path_item(&mut self, template: &str, value: &'a Value) -> Option<PathItemContract> {
        if !template.starts_with('/') {
            self.diagnostics
                .errors
                .push(format!("Path template must start with '/': {template}"));
            return None;
        }
        let item = self.deref(value, template)?;

        let shared = self.parameters(item.get("parameters"), template);
        let sensitive_headers = item
            .get(SENSITIVE_HEADERS_EXTENSION)
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_ascii_lowercase)
                    .collect()
            })
            .unwrap_or_default();

        let mut operations = Vec::new();
        for method in OPERATION_METHODS {
            let Some(op_value) = item.get(method) else {
                continue;
            };
            let context = format!("{} {}", method.to_uppercase(), template);
            let own = self.parameters(op_value.get("parameters"), &context);
            let parameters = merge_parameters(&shared, own);
            let request_body = op_value
                .get("requestBody")
                .and_then(|body| self.request_body(body, &context));
            let responses = self.responses(op_value.get("responses"), &context);

            operations.push(Arc::new(OperationContract {
                method: method.to_string(),
                path_template: template.to_string(),
                operation_id: op_value
                    .get("operationId")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                parameters,
                request_body,
                responses,
            }));
        }

        Some(PathItemContract {
            template: template.to_string(),
            operations,
            sensitive_headers,
        })
    }

    fn parameters(&mut self, value: Option<&'a Value>, context: &str) -> Vec<ParameterContract> {
        let Some(list) = value.and_then(Value::as_array) else {
            return Vec::new();
        };
        let mut parameters = Vec::with_capacity(list.len());
        for raw in list {
            let Some(param) = self.deref(raw, context) else {
                continue;
            };
            let name = param.get("name").and_then(Value::as_str);
            let location = param
                .get("in")
                .and_then(Value::as_str)
                .and_then(ParameterLocation::parse);
            let (Some(name), Some(location)) = (name, location) else {
                self.diagnostics
                    .errors
                    .push(format!("Parameter without valid 'name'/'in' at {context}"));
                continue;
            };
            let schema_context = format!("{context} parameter {name}");
            let schema = param
                .get("schema")
                .map(|schema| self.schema(schema, &schema_context, &mut Vec::new()));
            parameters.push(ParameterContract {
                name: name.to_string(),
                location,
                required: param
                    .get("required")
                    .and_then(Value::as_bool)
                    .unwrap_or(location == ParameterLocation::Path),
                schema,
            });
        }
        parameters
    }

    fn request_body(&mut self, value: &'a Value, context: &str) -> Option<RequestBodyContract> {
        let body = self.deref(value, context)?;
        Some(RequestBodyContract {
            required: body.get("required").and_then(Value::as_bool).unwrap_or(false),
            content: self.content(body.get("content"), &format!("{context} requestBody")),
        })
    }

    fn responses(&mut self, value: Option<&'a Value>, context: &str) -> Vec<(String, ResponseContract)> {
        let Some(entries) = value.and_then(Value::as_object) else {
            return Vec::new();
        };
        let mut responses = Vec::with_capacity(entries.len());
        for (code, raw) in entries {
            let response_context = format!("{context} response {code}");
            let Some(response) = self.deref(raw, &response_context) else {
                continue;
            };
            responses.push((
                code.clone(),
                ResponseContract {
                    content: self.content(response.get("content"), &response_context),
                },
            ));
        }
        responses
    }

    fn content(&mut self, value: Option<&'a Value>, context: &str) -> ContentMap {
        let Some(entries) = value.and_then(Value::as_object) else {
            return Vec::new();
        };
        entries
            .iter()
            .map(|(media_type, media)| {
                let schema = media.get("schema").map(|schema| {
                    self.schema(schema, &format!("{context} {media_type}"), &mut Vec::new())
                });
                (media_type.clone(), schema)
            })
            .collect()
    }

    fn schema(&mut self, value: &'a Value, context: &str, stack: &mut Vec<&'a str>) -> SchemaNode {
        if let Some(reference) = value.get("$ref").and_then(Value::as_str) {
            // 再帰スキーマは2周目以降を任意値として扱う
            if stack.contains(&reference) {
                return SchemaNode::default();
            }
            stack.push(reference);
            let node = match self.pointer(reference, context) {
                Some(target) => self.schema(target, context, stack),
                None => SchemaNode::default(),
            };
            stack.pop();
            return node;
        }

        let mut node = SchemaNode::default();

        if let Some(parts) = value.get("allOf").and_then(Value::as_array) {
            for part in parts {
                let sub = self.schema(part, context, stack);
                merge_schema(&mut node, sub);
            }
        }

        match value.get("type") {
            Some(Value::String(name)) => match SchemaType::parse(name) {
                Some(schema_type) => node.schema_type = Some(schema_type),
                None => self
                    .diagnostics
                    .warnings
                    .push(format!("Unknown schema type '{name}' at {context}")),
            },
            Some(Value::Array(names)) => {
                for name in names.iter().filter_map(Value::as_str) {
                    match SchemaType::parse(name) {
                        Some(SchemaType::Null) => node.nullable = true,
                        Some(schema_type) => node.schema_type = Some(schema_type),
                        None => self
                            .diagnostics
                            .warnings
                            .push(format!("Unknown schema type '{name}' at {context}")),
                    }
                }
            }
            _ => {}
        }

        if value.get("nullable").and_then(Value::as_bool) == Some(true) {
            node.nullable = true;
        }
        if let Some(format) = value.get("format").and_then(Value::as_str) {
            node.format = Some(format.to_string());
        }
        if let Some(pattern) = value.get("pattern").and_then(Value::as_str) {
            match SchemaPattern::new(pattern) {
                Ok(compiled) => node.pattern = Some(compiled),
                Err(e) => self
                    .diagnostics
                    .errors
                    .push(format!("Invalid pattern '{pattern}' at {context}: {e}")),
            }
        }
        if let Some(minimum) = value.get("minimum").and_then(Value::as_f64) {
            node.minimum = Some(minimum);
        }
        if let Some(maximum) = value.get("maximum").and_then(Value::as_f64) {
            node.maximum = Some(maximum);
        }
        if let Some(values) = value.get("enum").and_then(Value::as_array) {
            node.enum_values = values.clone();
        }
        if let Some(required) = value.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if !node.required.iter().any(|r| r == name) {
                    node.required.push(name.to_string());
                }
            }
        }
        if let Some(properties) = value.get("properties").and_then(Value::as_object) {
            for (name, property) in properties {
                let child = self.schema(property, &format!("{context}.{name}"), stack);
                if let Some(slot) = node.properties.iter_mut().find(|(key, _)| key == name) {
                    slot.1 = child;
                } else {
                    node.properties.push((name.clone(), child));
                }
            }
        }
        if let Some(items) = value.get("items") {
            node.items = Some(Box::new(self.schema(items, &format!("{context}[]"), stack)));
        }
        if value.get("additionalProperties").and_then(Value::as_bool) == Some(false) {
            node.additional_properties_allowed = false;
        }

        node
    }

    /// `$ref` を辿った先の値を返す（参照でなければそのまま）
    fn deref(&mut self, value: &'a Value, context: &str) -> Option<&'a Value> {
        let mut current = value;
        let mut hops = 0;
        while let Some(reference) = current.get("$ref").and_then(Value::as_str) {
            if hops >= MAX_REF_HOPS {
                self.diagnostics
                    .errors
                    .push(format!("Reference chain too deep at {context}: {reference}"));
                return None;
            }
            current = self.pointer(reference, context)?;
            hops += 1;
        }
        Some(current)
    }

    fn pointer(&mut self, reference: &str, context: &str) -> Option<&'a Value> {
        let root = self.root;
        let target = reference
            .strip_prefix('#')
            .and_then(|pointer| root.pointer(pointer));
        if target.is_none() {
            self.diagnostics
                .errors
                .push(format!("Unresolved reference {reference} at {context}"));
        }
        target
    }
}

/// パスレベルのパラメータにオペレーションレベルを上書き合成する（name + in で同一判定）
fn merge_parameters(
    shared: &[ParameterContract],
    own: Vec<ParameterContract>,
) -> Vec<ParameterContract> {
    let mut merged: Vec<ParameterContract> = shared
        .iter()
        .filter(|p| {
            !own.iter()
                .any(|o| o.name == p.name && o.location == p.location)
        })
        .cloned()
        .collect();
    merged.extend(own);
    merged
}

/// `allOf` の構成要素を合成する
fn merge_schema(target: &mut SchemaNode, source: SchemaNode) {
    if target.schema_type.is_none() {
        target.schema_type = source.schema_type;
    }
    target.nullable |= source.nullable;
    if target.format.is_none() {
        target.format = source.format;
    }
    if target.pattern.is_none() {
        target.pattern = source.pattern;
    }
    if target.minimum.is_none() {
        target.minimum = source.minimum;
    }
    if target.maximum.is_none() {
        target.maximum = source.maximum;
    }
    if target.enum_values.is_empty() {
        target.enum_values = source.enum_values;
    }
    for name in source.required {
        if !target.required.contains(&name) {
            target.required.push(name);
        }
    }
    for (name, schema) in source.properties {
        if !target.declares_property(&name) {
            target.properties.push((name, schema));
        }
    }
    if target.items.is_none() {
        target.items = source.items;
    }
    target.additional_properties_allowed &= source.additional_properties_allowed;
}
