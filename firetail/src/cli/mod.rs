//! CLI module for firetail
//!
//! Provides the standalone enforcement proxy and contract checking commands.

pub mod check;
pub mod serve;

use clap::{Parser, Subcommand};

/// Firetail - inline OpenAPI contract enforcement and audit logging proxy
#[derive(Parser, Debug)]
#[command(name = "firetail")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    FIRETAIL_API_KEY             Collector API key (required)
    FIRETAIL_API_HOST            Collector base URL (required)
    FIRETAIL_API_DOC_PATH        OpenAPI document path (required)
    FIRETAIL_BASE_PATH           Base path override (default: servers[0].url path)
    FIRETAIL_SENSITIVE_HEADERS   Extra headers to redact, comma separated
    FIRETAIL_LOG_MAX_ITEMS       Records per batch (default: 1000)
    FIRETAIL_LOG_MAX_SIZE        Bytes per batch (default: 950000)
    FIRETAIL_LOG_MAX_TIME_MS     Flush interval in milliseconds (default: 5000)
    FIRETAIL_LOG_LEVEL           Log level (default: info)
"#)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate traffic against the contract and forward it to an upstream service
    Serve(serve::ServeArgs),
    /// Load a contract document and print its diagnostics and operations
    Check(check::CheckArgs),
}
