//! Configuration for mesh nodes and clients.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};

/// Shared tunables for coordinators and clients.
///
/// `host` is the rendezvous address: the well-known host (typically a load
/// balancer fronting every coordinator) that both coordinators and clients
/// periodically resync their membership view against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Rendezvous host for coordinator resync.
    pub host: String,

    /// Cadence of listing heartbeats, TTL sweeps, and watch refreshes.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Cadence of the client's per-coordinator gossip polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Cadence of the client's rendezvous resync. Defaults to
    /// `poll_interval_ms * 10`.
    #[serde(default)]
    pub resync_interval_ms: Option<u64>,

    /// Heartbeats a listing may miss before the sweep evicts it.
    #[serde(default = "default_missed_heartbeats")]
    pub missed_heartbeats_allowed: u32,

    /// Cadence of the coordinator's rendezvous resync. Defaults to
    /// `heartbeat_interval_ms * 10`.
    #[serde(default)]
    pub resync_poll_duration_ms: Option<u64>,

    /// Log every listing heartbeat. Noisy, off by default.
    #[serde(default)]
    pub log_heartbeats: bool,
}

fn default_heartbeat_interval() -> u64 {
    20_000
}

fn default_poll_interval() -> u64 {
    60_000
}

fn default_missed_heartbeats() -> u32 {
    3
}

impl MeshConfig {
    /// Config with defaults for everything but the rendezvous host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            poll_interval_ms: default_poll_interval(),
            resync_interval_ms: None,
            missed_heartbeats_allowed: default_missed_heartbeats(),
            resync_poll_duration_ms: None,
            log_heartbeats: false,
        }
    }

    /// Load from an optional TOML file, then `MINIMESH_*` environment
    /// variables on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("MINIMESH"))
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::InvalidConfig("host must not be empty".into()));
        }
        if self.heartbeat_interval_ms == 0 || self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig("intervals must be non-zero".into()));
        }
        if self.missed_heartbeats_allowed == 0 {
            return Err(Error::InvalidConfig(
                "missed_heartbeats_allowed must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_millis(
            self.resync_interval_ms
                .unwrap_or(self.poll_interval_ms * 10),
        )
    }

    pub fn resync_poll_duration(&self) -> Duration {
        Duration::from_millis(
            self.resync_poll_duration_ms
                .unwrap_or(self.heartbeat_interval_ms * 10),
        )
    }

    /// How long a listing survives without a heartbeat.
    pub fn listing_ttl_ms(&self) -> u64 {
        self.heartbeat_interval_ms * self.missed_heartbeats_allowed as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MeshConfig::new("lb.internal:8000");
        assert_eq!(config.heartbeat_interval_ms, 20_000);
        assert_eq!(config.poll_interval_ms, 60_000);
        assert_eq!(config.missed_heartbeats_allowed, 3);
        assert_eq!(config.resync_interval(), Duration::from_millis(600_000));
        assert_eq!(config.resync_poll_duration(), Duration::from_millis(200_000));
        assert_eq!(config.listing_ttl_ms(), 60_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn explicit_resync_overrides_derived_default() {
        let mut config = MeshConfig::new("lb.internal:8000");
        config.resync_interval_ms = Some(5_000);
        config.resync_poll_duration_ms = Some(7_000);
        assert_eq!(config.resync_interval(), Duration::from_millis(5_000));
        assert_eq!(config.resync_poll_duration(), Duration::from_millis(7_000));
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = MeshConfig::new("");
        assert!(config.validate().is_err());

        config.host = "lb.internal:8000".into();
        config.heartbeat_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: MeshConfig = serde_json::from_str(r#"{ "host": "lb:8000" }"#).unwrap();
        assert_eq!(config.host, "lb:8000");
        assert_eq!(config.heartbeat_interval_ms, 20_000);
        assert!(!config.log_heartbeats);
    }
}
