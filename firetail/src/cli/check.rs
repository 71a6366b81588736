//! check サブコマンド
//!
//! コントラクトを読み込み、診断とオペレーション一覧を表示します。

use crate::contract::{Contract, ContractIndex, ContractLoader, OpenApiLoader};
use crate::error::Result;
use clap::Args;
use std::fmt::Write as _;
use std::path::PathBuf;

/// check サブコマンドの引数
#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// OpenAPI document (JSON or YAML)
    pub doc: PathBuf,

    /// Base path override
    #[arg(long)]
    pub base_path: Option<String>,
}

/// check サブコマンドを実行
///
/// 診断にエラーがあれば `Err` を返す。
pub fn execute(args: &CheckArgs) -> Result<()> {
    let (contract, diagnostics) = OpenApiLoader.load(&args.doc)?;

    for warning in &diagnostics.warnings {
        println!("warning: {}", warning);
    }
    for error in &diagnostics.errors {
        println!("error: {}", error);
    }
    let diagnostics = diagnostics.into_result()?;

    let index = ContractIndex::new(contract, args.base_path.as_deref());
    println!(
        "OpenAPI {} | base path: {} | {} operations",
        diagnostics.specification_version.as_deref().unwrap_or("?"),
        if index.base_path().is_empty() {
            "/"
        } else {
            index.base_path()
        },
        index.contract().operation_count()
    );
    print!("{}", render_operations(index.contract()));
    Ok(())
}

/// オペレーション一覧を表形式で整形する
pub fn render_operations(contract: &Contract) -> String {
    let mut out = String::new();
    for item in &contract.paths {
        for operation in &item.operations {
            let _ = writeln!(
                out,
                "{:<7} {:<48} {}",
                operation.method.to_ascii_uppercase(),
                item.template,
                operation.operation_id.as_deref().unwrap_or("-")
            );
        }
    }
    out
}
