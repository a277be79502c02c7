use std::path::PathBuf;

use clap::Parser;

use forward_proxy::config::{load_config, ProxyConfig};
use forward_proxy::lifecycle;
use forward_proxy::observability::logging;

/// Transparent HTTP forward proxy.
#[derive(Parser, Debug)]
#[command(name = "forward-proxy", version, about)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address, e.g. 127.0.0.1:3128.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "forward-proxy starting");

    lifecycle::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
