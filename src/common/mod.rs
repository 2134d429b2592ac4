//! Common utilities and types shared across minimesh

pub mod config;
pub mod error;
pub mod polling;
pub mod rpc;
pub mod time;
pub mod types;

pub use config::MeshConfig;
pub use error::{Error, Result};
pub use polling::{repeat, RunOutcome};
pub use rpc::{CoordinatorRpc, HttpCoordinatorClient, HttpRpcFactory, RpcFactory};
pub use time::{Clock, SystemClock};
pub use types::{CoordinatorDescriptor, Listing};
