//! Campus - room reservation across three campuses
//!
//! `campus registry` runs the well-known directory service.
//! `campus node --campus dvl` runs the node for one campus.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod error;
mod run;

use cli::{Cli, Command};
use error::AppResult;

fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve(cli)) {
        tracing::error!("Fatal: {}", e);
        std::process::exit(1);
    }
}

async fn serve(cli: Cli) -> AppResult<()> {
    let config = cli.resolve_config()?;

    match cli.command {
        Command::Registry { .. } => {
            let server = run::start_registry(&config.registry).await?;
            tracing::info!(addr = %server.addr(), "Registry ready");
            wait_for_shutdown().await;
            server.shutdown();
        }
        Command::Node { .. } => {
            let server = run::start_node(&config.node).await?;
            tracing::info!(
                client = %server.client_addr(),
                inter_node = %server.inter_node_addr(),
                "Campus node ready"
            );
            wait_for_shutdown().await;
            server.shutdown();
        }
    }
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Unable to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
