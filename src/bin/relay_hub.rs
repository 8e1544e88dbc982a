//! relay-hub - WebSocket relay for robot simulators and control panels

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use simrelay::RelayConfig;
use simrelay::RelayHub;
use simrelay::config::SequenceSourceConfig;

/// Relay hub: client registry, message routing and timed sequence push
#[derive(Parser)]
#[command(name = "relay-hub")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:8080
    #[arg(short, long)]
    listen: Option<String>,

    /// Sequence document (JSON or YAML) served on test_sequence_request
    #[arg(short, long)]
    sequence: Option<PathBuf>,

    /// Controllable joints per frame of the sequence document
    #[arg(long, default_value = "6")]
    joint_count: usize,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RelayConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => RelayConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.hub.listen_address = listen;
    }
    if let Some(path) = cli.sequence {
        config.hub.sequence = SequenceSourceConfig::File { path, joint_count: cli.joint_count };
    }
    config.validate()?;

    if cli.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    let level = if cli.verbose { "debug" } else { config.logging.level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    info!("relay-hub v{}", env!("CARGO_PKG_VERSION"));
    let hub = RelayHub::bind(config.hub.clone())
        .await
        .with_context(|| format!("binding {}", config.hub.listen_address))?
        .spawn()?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for ctrl-c")?;
            info!("Shutting down");
            hub.shutdown();
        }
        _ = hub.closed() => {}
    }
    Ok(())
}
