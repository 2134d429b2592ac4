//! CLI for poking at a running mesh

use clap::{Parser, Subcommand};
use minimesh::common::{CoordinatorRpc, HttpCoordinatorClient, Listing};

#[derive(Parser)]
#[command(name = "minimesh")]
#[command(about = "minimesh service-discovery CLI")]
#[command(version)]
struct Cli {
    /// Coordinator host to query
    #[arg(long, default_value = "localhost:8000")]
    coordinator: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the coordinator's membership view
    Coordinators,

    /// List services with live listings
    Services,

    /// List listings for a service
    Listings {
        /// Service name
        service: String,
    },

    /// Heartbeat a listing once
    Publish {
        /// Service name
        service: String,

        /// Host the service instance answers on
        host: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = HttpCoordinatorClient::new(&cli.coordinator);

    match cli.command {
        Commands::Coordinators => {
            let coordinators = client.get_coordinators().await?;
            println!("Coordinators known to [{}]:", cli.coordinator);
            for coordinator in coordinators {
                println!("  {}", coordinator.host);
            }
        }

        Commands::Services => {
            let services = client.get_services().await?;
            if services.is_empty() {
                println!("No services");
            } else {
                for service in services {
                    println!("{}", service);
                }
            }
        }

        Commands::Listings { service } => {
            let listings = client.get_listings(&service).await?;
            if listings.is_empty() {
                println!("No listings for service [{}]", service);
            } else {
                println!("Listings for service [{}]:", service);
                for listing in listings {
                    println!("  {}", listing.host);
                }
            }
        }

        Commands::Publish { service, host } => {
            client.listing_heartbeat(&Listing::new(&service, &host)).await?;
            println!("Published [{}] for service [{}]", host, service);
        }
    }

    Ok(())
}
