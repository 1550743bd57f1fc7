use anyhow::Result;
use clap::{Parser, Subcommand};
use questline_node::api::start_api_server;
use questline_node::{logging, NodeConfig, QuestlineNode};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "questline")]
#[command(about = "Questline - chat mini-app reward engine node", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node
    Start {
        /// Host for the HTTP API
        #[arg(long)]
        host: Option<String>,

        /// Port for the HTTP API
        #[arg(long)]
        port: Option<u16>,
    },

    /// Write a default configuration file
    Init {
        /// Output path for the configuration
        #[arg(short, long, default_value = "questline.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Start { host, port } => {
            let mut config = NodeConfig::load(cli.config.as_deref())?;
            if let Some(host) = host {
                config.api.host = host;
            }
            if let Some(port) = port {
                config.api.port = port;
            }

            let node = Arc::new(QuestlineNode::new(config.clone())?);
            let api_handle = start_api_server(node, &config.api.host, config.api.port);

            info!(name = %config.node.name, "🚀 Node started");

            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
            api_handle.abort();
        }
        Commands::Init { output } => {
            let config = NodeConfig::default();
            std::fs::write(&output, toml::to_string_pretty(&config)?)?;
            println!("Wrote default configuration to {}", output.display());
        }
    }

    Ok(())
}
