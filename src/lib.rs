//! # minimesh
//!
//! A lightweight service-discovery mesh:
//! - Coordinator nodes that gossip membership among themselves
//! - A heartbeat-driven listings registry with TTL eviction
//! - A client that publishes listings and watches services
//! - HTTP+JSON for everything; a plain load balancer is the only
//!   well-known address the mesh needs
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────────┐
//!            │  rendezvous LB   │
//!            └────────┬─────────┘
//!                     │ resync (pull view, re-announce)
//!      ┌──────────────┼──────────────┐
//! ┌────▼─────┐   ┌────▼─────┐   ┌────▼─────┐
//! │ coord A  │◄──┤ coord B  ├──►│ coord C  │
//! │ listings │   │ listings │   │ listings │
//! └────▲─────┘   └────▲─────┘   └────▲─────┘
//!      │ heartbeats   │ gossip pulls │
//!      └──────────────┴──────────────┘
//!                  clients
//! ```
//!
//! Every coordinator carries the full listings registry; clients heartbeat
//! their publications to every coordinator they know, so losing any single
//! node loses nothing.
//!
//! ## Usage
//!
//! ### Start a coordinator
//! ```bash
//! minimesh-coord serve \
//!   --bind 0.0.0.0:8000 \
//!   --announce coord-1.internal:8000 \
//!   --rendezvous mesh-lb.internal:8000
//! ```
//!
//! ### Use the CLI
//! ```bash
//! # Membership view of a coordinator
//! minimesh coordinators --coordinator localhost:8000
//!
//! # Services and their listings
//! minimesh services
//! minimesh listings billing
//!
//! # One-shot publish (heartbeat a listing once)
//! minimesh publish billing billing-1.internal:9000
//! ```

pub mod client;
pub mod common;
pub mod coordinator;

// Re-export commonly used types
pub use client::{MeshClient, Watch, WatchConfig};
pub use common::{Error, Listing, MeshConfig, Result};
pub use coordinator::Coordinator;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
