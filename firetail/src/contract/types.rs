//! コントラクトの型定義
//!
//! OpenAPIドキュメントから組み立てた不変のコントラクトモデル。
//! 読み込み後は `Arc` で共有され、全リクエストから読み取り専用で参照される。

use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

/// パラメータの位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterLocation {
    /// パスパラメータ
    Path,
    /// クエリパラメータ
    Query,
    /// ヘッダー
    Header,
    /// Cookie
    Cookie,
}

impl ParameterLocation {
    /// OpenAPIの `in` 値から変換
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }

    /// 文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
        }
    }
}

impl std::fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// スキーマの型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaType {
    /// string
    String,
    /// integer
    Integer,
    /// number
    Number,
    /// boolean
    Boolean,
    /// object
    Object,
    /// array
    Array,
    /// null
    Null,
}

impl SchemaType {
    /// OpenAPIの `type` 値から変換
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    /// 文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Null => "null",
        }
    }

    /// integer と number は相互に互換とみなす
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Number)
    }
}

impl std::fmt::Display for SchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 読み込み時にコンパイル済みの `pattern`
#[derive(Debug, Clone)]
pub struct SchemaPattern {
    source: String,
    regex: Regex,
}

impl SchemaPattern {
    /// パターンをコンパイルする
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            source: source.to_string(),
            regex: Regex::new(source)?,
        })
    }

    /// 元のパターン文字列
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// 値がパターンにマッチするか
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

/// スキーマノード（再帰構造）
#[derive(Debug, Clone)]
pub struct SchemaNode {
    /// 宣言された型（未宣言なら任意の値を受け入れる）
    pub schema_type: Option<SchemaType>,
    /// null を許可するか
    pub nullable: bool,
    /// format (`email`, `uuid`, `date-time`, `int32` など)
    pub format: Option<String>,
    /// pattern
    pub pattern: Option<SchemaPattern>,
    /// minimum
    pub minimum: Option<f64>,
    /// maximum
    pub maximum: Option<f64>,
    /// enum
    pub enum_values: Vec<Value>,
    /// 必須プロパティ名
    pub required: Vec<String>,
    /// プロパティ（宣言順）
    pub properties: Vec<(String, SchemaNode)>,
    /// 配列要素のスキーマ
    pub items: Option<Box<SchemaNode>>,
    /// 宣言外プロパティを許可するか
    pub additional_properties_allowed: bool,
}

impl Default for SchemaNode {
    fn default() -> Self {
        Self {
            schema_type: None,
            nullable: false,
            format: None,
            pattern: None,
            minimum: None,
            maximum: None,
            enum_values: Vec::new(),
            required: Vec::new(),
            properties: Vec::new(),
            items: None,
            additional_properties_allowed: true,
        }
    }
}

impl SchemaNode {
    /// 指定した型のスキーマを作成
    pub fn of_type(schema_type: SchemaType) -> Self {
        Self {
            schema_type: Some(schema_type),
            ..Self::default()
        }
    }

    /// プロパティを名前で検索
    pub fn property(&self, name: &str) -> Option<&SchemaNode> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, schema)| schema)
    }

    /// プロパティが宣言されているか
    pub fn declares_property(&self, name: &str) -> bool {
        self.properties.iter().any(|(key, _)| key == name)
    }

    /// 実効的な型
    ///
    /// `type` が省略されていても `properties` / `required` があればobjectとして扱う。
    pub fn effective_type(&self) -> Option<SchemaType> {
        match self.schema_type {
            Some(t) => Some(t),
            None if !self.properties.is_empty() || !self.required.is_empty() => {
                Some(SchemaType::Object)
            }
            None if self.items.is_some() => Some(SchemaType::Array),
            None => None,
        }
    }

    /// JSON値の数値型名（format が int32/int64 のときだけ integer）
    pub fn numeric_kind(&self) -> SchemaType {
        match self.format.as_deref() {
            Some("int32") | Some("int64") => SchemaType::Integer,
            _ => SchemaType::Number,
        }
    }
}

/// パラメータ定義
#[derive(Debug, Clone)]
pub struct ParameterContract {
    /// パラメータ名
    pub name: String,
    /// 位置
    pub location: ParameterLocation,
    /// 必須か
    pub required: bool,
    /// スキーマ
    pub schema: Option<SchemaNode>,
}

/// メディアタイプごとのスキーマ（宣言順）
pub type ContentMap = Vec<(String, Option<SchemaNode>)>;

/// リクエストボディ定義
#[derive(Debug, Clone, Default)]
pub struct RequestBodyContract {
    /// 必須か
    pub required: bool,
    /// Content-Type → スキーマ
    pub content: ContentMap,
}

impl RequestBodyContract {
    /// 宣言されたメディアタイプ一覧
    pub fn media_types(&self) -> Vec<&str> {
        self.content.iter().map(|(key, _)| key.as_str()).collect()
    }

    /// メディアタイプが宣言されているか（完全一致）
    pub fn media_type(&self, media_type: &str) -> Option<&Option<SchemaNode>> {
        self.content
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(media_type))
            .map(|(_, schema)| schema)
    }
}

/// レスポンス定義
#[derive(Debug, Clone, Default)]
pub struct ResponseContract {
    /// Content-Type → スキーマ
    pub content: ContentMap,
}

impl ResponseContract {
    /// メディアタイプに対応するスキーマ宣言
    pub fn media_type(&self, media_type: &str) -> Option<&Option<SchemaNode>> {
        self.content
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(media_type))
            .map(|(_, schema)| schema)
    }
}

/// オペレーション定義（path + method）
#[derive(Debug, Clone)]
pub struct OperationContract {
    /// HTTPメソッド（小文字）
    pub method: String,
    /// パステンプレート
    pub path_template: String,
    /// operationId
    pub operation_id: Option<String>,
    /// パラメータ（宣言順）
    pub parameters: Vec<ParameterContract>,
    /// リクエストボディ
    pub request_body: Option<RequestBodyContract>,
    /// ステータスコード文字列または `default` → レスポンス
    pub responses: Vec<(String, ResponseContract)>,
}

impl OperationContract {
    /// ステータスコードに対応するレスポンス（なければ `default`）
    pub fn response_for(&self, status: u16) -> Option<&ResponseContract> {
        let code = status.to_string();
        self.responses
            .iter()
            .find(|(key, _)| *key == code)
            .or_else(|| self.responses.iter().find(|(key, _)| key == "default"))
            .map(|(_, response)| response)
    }
}

/// パスアイテム（テンプレートごとの操作集合）
#[derive(Debug, Clone)]
pub struct PathItemContract {
    /// パステンプレート（例: `/instances/{instanceId}`）
    pub template: String,
    /// メソッドごとのオペレーション
    pub operations: Vec<Arc<OperationContract>>,
    /// `x-ft-sensitive-headers` 拡張で宣言された秘匿ヘッダー
    pub sensitive_headers: Vec<String>,
}

impl PathItemContract {
    /// メソッドに対応するオペレーション
    pub fn operation(&self, method: &str) -> Option<&Arc<OperationContract>> {
        self.operations
            .iter()
            .find(|op| op.method.eq_ignore_ascii_case(method))
    }
}

/// 読み込み済みコントラクト
#[derive(Debug, Clone, Default)]
pub struct Contract {
    /// `openapi` バージョン文字列
    pub openapi_version: String,
    /// `servers[0].url` から導出したベースパス
    pub base_path: String,
    /// パスアイテム（宣言順）
    pub paths: Vec<Arc<PathItemContract>>,
}

impl Contract {
    /// 全オペレーション数
    pub fn operation_count(&self) -> usize {
        self.paths.iter().map(|item| item.operations.len()).sum()
    }
}
