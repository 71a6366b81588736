//! Firetail proxy entry point

use anyhow::Context;
use clap::Parser;
use firetail::cli::{check, serve::ServeArgs, Cli, Commands};
use firetail::config::FiretailConfig;
use firetail::proxy::UpstreamProxy;
use firetail::shutdown::ShutdownController;
use firetail::{logging, server, Firetail};
use tracing::info;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init().context("failed to initialize logging")?;

    match cli.command {
        Commands::Check(args) => {
            check::execute(&args)?;
            Ok(())
        }
        Commands::Serve(args) => {
            let runtime = tokio::runtime::Runtime::new().context("failed to create runtime")?;
            runtime.block_on(run_serve(args))
        }
    }
}

async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = args.apply_overrides(FiretailConfig::from_env());
    let client = reqwest::Client::new();
    let shutdown = ShutdownController::new();

    let firetail = Firetail::initialize(config, client.clone(), shutdown.clone())
        .context("failed to initialize firetail")?;
    info!(upstream = %args.upstream, "Forwarding validated traffic upstream");

    let app = server::build_router(
        firetail.pipeline.clone(),
        UpstreamProxy::new(client, args.upstream.clone()),
    );
    let result = server::run(app, &args.bind_addr(), shutdown).await;

    firetail.shutdown().await;
    result?;
    Ok(())
}
