#![forbid(unsafe_code)]
//! Full emberchain node: P2P sync, mining and the HTTP facade.

use clap::Parser;
use emberchain::config::load_config;
use emberchain::node::Node;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
    /// Overrides `network.p2p_port`
    #[arg(long)]
    p2p_port: Option<u16>,
    /// Overrides `network.api_port`
    #[arg(long)]
    api_port: Option<u16>,
    /// Comma-separated WebSocket URLs, replacing `network.bootstrap_peers`
    #[arg(long, value_delimiter = ',')]
    peers: Option<Vec<String>>,
    /// Overrides `wallet.key_path`
    #[arg(long)]
    key_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(port) = cli.p2p_port {
        config.network.p2p_port = port;
    }
    if let Some(port) = cli.api_port {
        config.network.api_port = port;
    }
    if let Some(peers) = cli.peers {
        config.network.bootstrap_peers = peers;
    }
    if let Some(path) = cli.key_path {
        config.wallet.key_path = path;
    }

    let node = Node::init(config)?;
    node.run().await?;
    Ok(())
}
