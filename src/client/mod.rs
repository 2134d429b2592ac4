//! Client side of the mesh: coordinator discovery, publication, watches.

pub mod client;
pub mod updaters;
pub mod watch;

pub use client::MeshClient;
pub use updaters::{FilterUpdater, ListUpdater, ListingFilter, RandomUpdater, Updater};
pub use watch::{Watch, WatchConfig};
