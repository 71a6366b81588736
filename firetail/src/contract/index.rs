//! パステンプレートによるオペレーション解決
//!
//! テンプレートごとの正規表現はコントラクト読み込み時に一度だけコンパイルし、
//! 全リクエストで再利用する。
//!
//! 複数テンプレートにマッチし得る場合（例: `/users/{id}` と `/users/me`）は
//! **宣言順で最初にマッチしたもの**を採用する。最長一致は行わないため、
//! 具体的なテンプレートを先に宣言すること。

use crate::contract::types::{Contract, OperationContract, PathItemContract};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

static TEMPLATE_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^/{}]+)\}").expect("static template regex"));

/// パス解決結果
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// 構造的にマッチしたパスアイテム
    pub path_item: Option<Arc<PathItemContract>>,
    /// メソッドまで一致したオペレーション
    pub operation: Option<Arc<OperationContract>>,
    /// 抽出したパスパラメータ
    pub path_parameters: HashMap<String, String>,
    /// マッチしたテンプレート（`/` を `.` に置換した形、例: `.instances.{instanceId}`）
    pub matched_template: String,
}

impl Resolution {
    /// ルートが見つかったか
    pub fn is_route_found(&self) -> bool {
        self.path_item.is_some()
    }
}

struct CompiledRoute {
    item: Arc<PathItemContract>,
    matcher: Regex,
    /// (キャプチャグループ名, パラメータ名)
    groups: Vec<(String, String)>,
}

/// コントラクトインデックス
pub struct ContractIndex {
    contract: Arc<Contract>,
    base_path: String,
    routes: Vec<CompiledRoute>,
}

impl std::fmt::Debug for ContractIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractIndex")
            .field("base_path", &self.base_path)
            .field("routes", &self.routes.len())
            .finish()
    }
}

impl ContractIndex {
    /// コントラクトからインデックスを構築する
    ///
    /// `base_path_override` が `None` の場合はコントラクトの `servers[0].url` 由来のベースパスを使う。
    pub fn new(contract: Contract, base_path_override: Option<&str>) -> Self {
        let base_path = base_path_override
            .map(str::to_string)
            .unwrap_or_else(|| contract.base_path.clone());
        let mut routes = Vec::with_capacity(contract.paths.len());
        for item in &contract.paths {
            match compile_template(&item.template, &base_path) {
                Ok((matcher, groups)) => routes.push(CompiledRoute {
                    item: Arc::clone(item),
                    matcher,
                    groups,
                }),
                Err(e) => warn!(
                    template = %item.template,
                    error = %e,
                    "Skipping path template that cannot be compiled"
                ),
            }
        }
        Self {
            contract: Arc::new(contract),
            base_path,
            routes,
        }
    }

    /// 元のコントラクト
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// 有効なベースパス
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// パスとメソッドからオペレーションを解決する
    pub fn resolve(&self, path: &str, method: &str) -> Resolution {
        let request_path = path.trim_end_matches('/');

        for route in &self.routes {
            let Some(captures) = route.matcher.captures(request_path) else {
                continue;
            };
            let path_parameters = route
                .groups
                .iter()
                .filter_map(|(group, name)| {
                    captures
                        .name(group)
                        .map(|m| (name.clone(), m.as_str().to_string()))
                })
                .collect();
            return Resolution {
                operation: route.item.operation(method).cloned(),
                path_item: Some(Arc::clone(&route.item)),
                path_parameters,
                matched_template: route.item.template.replace('/', "."),
            };
        }

        Resolution::default()
    }
}

/// `^/?(?:<base>/)?<template>$` 形式の大文字小文字を区別しない正規表現を組み立てる
fn compile_template(
    template: &str,
    base_path: &str,
) -> Result<(Regex, Vec<(String, String)>), regex::Error> {
    let mut pattern = String::from("^/?(?:");
    pattern.push_str(&regex::escape(base_path.trim_start_matches('/')));
    pattern.push_str("/)?");

    let body = template.trim_start_matches('/');
    let mut groups = Vec::new();
    let mut last = 0;
    for captures in TEMPLATE_PARAM.captures_iter(body) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        pattern.push_str(&regex::escape(&body[last..whole.start()]));
        // パラメータ名は正規表現のグループ名として使えるとは限らないため位置で命名する
        let group = format!("p{}", groups.len());
        pattern.push_str(&format!("(?P<{group}>[^/]+)"));
        groups.push((group, name.as_str().to_string()));
        last = whole.end();
    }
    pattern.push_str(&regex::escape(&body[last..]));
    pattern.push('$');

    let matcher = RegexBuilder::new(&pattern).case_insensitive(true).build()?;
    Ok((matcher, groups))
}
