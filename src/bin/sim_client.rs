//! sim-client - simulated six-axis arm attached to a relay hub

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use simrelay::protocol::MessageType;
use simrelay::protocol::payloads::ClientsList;
use simrelay::{ControlSession, RelayConfig, SimulatedArm, TransportClient, UpdateRate};

/// Simulated robot arm client for the relay hub
#[derive(Parser)]
#[command(name = "sim-client")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Hub URL, e.g. ws://127.0.0.1:8080
    #[arg(short, long)]
    url: Option<String>,

    /// Name announced to the hub
    #[arg(short, long)]
    name: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the simulated arm, publishing its state until ctrl-c
    Simulate {
        /// Ask the hub for its test sequence once connected
        #[arg(long)]
        request_sequence: bool,
    },

    /// Log robot states published by other clients
    Watch {
        /// Maximum updates per second per source, 0 for all
        #[arg(short, long, default_value = "10")]
        rate: u32,
    },

    /// Print the hub's client roster and exit
    Clients,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RelayConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => RelayConfig::default(),
    };
    if let Some(url) = cli.url {
        config.client.url = url;
    }
    if let Some(name) = cli.name {
        config.client.name = name;
    }

    let level = if cli.verbose { "debug" } else { config.logging.level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let client = TransportClient::websocket(config.client.clone());
    let client_id = client
        .connect()
        .await
        .with_context(|| format!("connecting to {}", config.client.url))?;
    info!(client_id, name = %config.client.name, "Connected");

    client.on(MessageType::ReconnectFailed.as_str(), |_| {
        warn!("Hub unreachable, reconnection abandoned");
        Ok(())
    });

    match cli.command {
        Commands::Simulate { request_sequence } => {
            config.sync.enabled = true;
            let session = ControlSession::new(client.clone(), Arc::new(SimulatedArm::six_axis()), &config);
            if request_sequence {
                session.request_test_sequence();
            }
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            session.stop_sequence();
        }
        Commands::Watch { rate } => {
            let session = ControlSession::new(client.clone(), Arc::new(SimulatedArm::six_axis()), &config);
            let rate = if rate == 0 { UpdateRate::Every } else { UpdateRate::Max(rate) };
            let mut states = session.remote_states(rate);
            loop {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        result.context("waiting for ctrl-c")?;
                        break;
                    }
                    update = states.next() => match update {
                        Some(update) => {
                            let angles: Vec<String> = update
                                .state
                                .joints
                                .iter()
                                .map(|j| format!("{}={:.1}", j.name, j.angle))
                                .collect();
                            println!("[{}] {}", update.source_client_id, angles.join(" "));
                        }
                        None => break,
                    }
                }
            }
        }
        Commands::Clients => {
            let mut lists = client.subscribe(MessageType::ClientsList.as_str());
            let session = ControlSession::new(client.clone(), Arc::new(SimulatedArm::six_axis()), &config);
            session.request_clients();
            let message = tokio::time::timeout(Duration::from_secs(5), lists.next())
                .await
                .context("waiting for the client roster")?
                .context("connection closed before the roster arrived")?;
            let list: ClientsList = message.payload()?;
            for info in list.clients {
                println!("{:>4}  {:<10}  {}", info.id, info.client_type.to_string(), info.name);
            }
        }
    }

    client.disconnect().await;
    client.shutdown();
    Ok(())
}
