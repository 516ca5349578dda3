//! Interstitial Daemon - framing proxy for chat completions

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use interstitial::config::Config;
use interstitial::error::Result;
use interstitial::proxy::ProxyServer;

/// Interstitial - streaming proxy that frames chat requests for a local model
#[derive(Parser)]
#[command(name = "interstitial")]
#[command(about = "A streaming proxy that frames chat requests for a local inference server")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Override the listen address from the config file
    #[arg(long, global = true)]
    pub listen: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the proxy server (default command)
    #[command(name = "serve")]
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => serve(cli.config, cli.listen).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,interstitial=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config_path: Option<PathBuf>, listen: Option<String>) -> Result<()> {
    tracing::info!("Starting Interstitial daemon");

    let mut config = Config::load(config_path.as_deref())?;
    if let Some(addr) = listen {
        config.server.listen_addr = addr;
    }
    config.validate()?;
    tracing::debug!("Config loaded: {:?}", config);

    let proxy = ProxyServer::new(config);
    proxy.serve().await?;

    tracing::info!("Interstitial daemon stopped");
    Ok(())
}
