//! Coordinator server: wires the brokers together and serves the HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::common::{
    Clock, CoordinatorDescriptor, HttpRpcFactory, MeshConfig, Result, RpcFactory, SystemClock,
};
use crate::coordinator::http::{create_router, CoordState};
use crate::coordinator::listings::ListingsBroker;
use crate::coordinator::membership::CoordinatorBroker;

pub struct Coordinator {
    config: MeshConfig,
    bind_addr: SocketAddr,
    announce_host: String,
}

impl Coordinator {
    /// `announce_host` is this node's address as peers and clients reach it;
    /// it becomes the node's descriptor in the membership view.
    /// `config.host` is the rendezvous address the node resyncs against.
    pub fn new(config: MeshConfig, bind_addr: SocketAddr, announce_host: impl Into<String>) -> Self {
        Self {
            config,
            bind_addr,
            announce_host: announce_host.into(),
        }
    }

    pub async fn serve(self) -> Result<()> {
        self.config.validate()?;

        tracing::info!("starting coordinator [{}]", self.announce_host);
        tracing::info!("  HTTP API: {}", self.bind_addr);
        tracing::info!("  rendezvous: {}", self.config.host);
        tracing::info!(
            "  heartbeat interval: {}ms, missed allowed: {}",
            self.config.heartbeat_interval_ms,
            self.config.missed_heartbeats_allowed
        );

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let factory: Arc<dyn RpcFactory> = Arc::new(HttpRpcFactory::new());

        let listings = Arc::new(ListingsBroker::new(&self.config, clock));
        listings.clone().start_sweeper();

        let membership = CoordinatorBroker::new(
            CoordinatorDescriptor::new(&self.announce_host),
            &self.config,
            factory,
        );
        membership.start_resync();

        let router = create_router(CoordState {
            membership,
            listings,
        });

        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        tracing::info!("coordinator ready on {}", self.bind_addr);
        axum::serve(listener, router).await?;

        Ok(())
    }
}
