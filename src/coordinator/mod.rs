//! Server side of the mesh: membership gossip, the listings registry, and
//! the HTTP API that exposes both.

pub mod http;
pub mod listings;
pub mod membership;
pub mod server;

pub use http::{create_router, CoordState};
pub use listings::ListingsBroker;
pub use membership::CoordinatorBroker;
pub use server::Coordinator;
