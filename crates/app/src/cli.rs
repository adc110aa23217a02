//! Command-line interface
//!
//! Flags override values read from the optional config file.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use campus_core::{Campus, Config};

use crate::error::AppResult;

#[derive(Parser, Debug)]
#[command(
    name = "campus",
    version,
    about = "Campus room reservation registry and nodes",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the registry
    Registry {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface to bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run the node for one campus
    Node {
        /// Campus served by this node (dvl, kkl, wst)
        #[arg(long)]
        campus: Option<Campus>,

        /// Host to bind and publish
        #[arg(long)]
        host: Option<String>,

        /// Registry host
        #[arg(long)]
        registry_host: Option<String>,

        /// Registry port
        #[arg(long)]
        registry_port: Option<u16>,

        /// Timeout for registry and peer calls, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

impl Cli {
    /// Load the config file, if any, then apply flag overrides
    pub fn resolve_config(&self) -> AppResult<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        match &self.command {
            Command::Registry { port, bind } => {
                if let Some(port) = port {
                    config.registry.port = *port;
                }
                if let Some(bind) = bind {
                    config.registry.bind_host = bind.clone();
                }
            }
            Command::Node {
                campus,
                host,
                registry_host,
                registry_port,
                timeout_ms,
            } => {
                let node = &mut config.node;
                if campus.is_some() {
                    node.campus = *campus;
                }
                if let Some(host) = host {
                    node.host = host.clone();
                }
                if let Some(registry_host) = registry_host {
                    node.registry_host = registry_host.clone();
                }
                if let Some(registry_port) = registry_port {
                    node.registry_port = *registry_port;
                }
                if let Some(timeout_ms) = timeout_ms {
                    node.peer_timeout_ms = *timeout_ms;
                }
            }
        }

        config.validate()?;
        Ok(config)
    }
}
