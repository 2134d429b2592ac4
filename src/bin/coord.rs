//! Coordinator binary

use clap::{Parser, Subcommand};
use minimesh::{Coordinator, MeshConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "minimesh-coord")]
#[command(about = "minimesh service-discovery coordinator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start coordinator server
    Serve {
        /// Bind address for the HTTP API
        #[arg(long, default_value = "0.0.0.0:8000")]
        bind: String,

        /// This node's address as peers and clients reach it
        #[arg(long)]
        announce: String,

        /// Rendezvous host to resync membership against
        #[arg(long)]
        rendezvous: Option<String>,

        /// Config file (TOML); CLI flags take priority
        #[arg(long)]
        config: Option<PathBuf>,

        /// Listing heartbeat interval in milliseconds
        #[arg(long)]
        heartbeat_interval_ms: Option<u64>,

        /// Heartbeats a listing may miss before eviction
        #[arg(long)]
        missed_heartbeats: Option<u32>,

        /// Log every listing heartbeat
        #[arg(long)]
        log_heartbeats: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            announce,
            rendezvous,
            config,
            heartbeat_interval_ms,
            missed_heartbeats,
            log_heartbeats,
        } => {
            let mut mesh_config = match config {
                Some(path) => MeshConfig::load(Some(&path))?,
                // Without a rendezvous the node resyncs against itself,
                // which is a fine single-node setup.
                None => MeshConfig::new(rendezvous.clone().unwrap_or_else(|| announce.clone())),
            };
            if let Some(host) = rendezvous {
                mesh_config.host = host;
            }
            if let Some(interval) = heartbeat_interval_ms {
                mesh_config.heartbeat_interval_ms = interval;
            }
            if let Some(missed) = missed_heartbeats {
                mesh_config.missed_heartbeats_allowed = missed;
            }
            if log_heartbeats {
                mesh_config.log_heartbeats = true;
            }

            let bind_addr = bind.parse()?;
            Coordinator::new(mesh_config, bind_addr, announce)
                .serve()
                .await?;
        }
    }

    Ok(())
}
