//! Wire records for the mesh: coordinator descriptors and service listings.
//!
//! Both records are partially opaque. The fields the mesh cares about are
//! typed; everything else a publisher attaches rides along in `extras` and is
//! returned verbatim to consumers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{Error, Result};

/// A coordinator node as announced over the wire. Identity is the `host`
/// string (typically `host:port`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorDescriptor {
    pub host: String,

    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

impl CoordinatorDescriptor {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            extras: serde_json::Map::new(),
        }
    }

    /// Parse an arbitrary JSON body into a descriptor. A missing or empty
    /// `host` is a validation failure, not a deserialization panic.
    pub fn from_value(value: Value) -> Result<Self> {
        let descriptor: Self = serde_json::from_value(value)
            .map_err(|e| Error::Validation(format!("coordinator descriptor: {}", e)))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Validation(
                "coordinator descriptor must specify a host".into(),
            ));
        }
        Ok(())
    }
}

/// A published service instance. Identity is `(service, host)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub service: String,
    pub host: String,

    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

impl Listing {
    pub fn new(service: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            host: host.into(),
            extras: serde_json::Map::new(),
        }
    }

    /// Attach an opaque metadata field.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    /// Parse an arbitrary JSON body into a listing, validating required
    /// fields.
    pub fn from_value(value: Value) -> Result<Self> {
        let listing: Self = serde_json::from_value(value)
            .map_err(|e| Error::Validation(format!("listing: {}", e)))?;
        listing.validate()?;
        Ok(listing)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.is_empty() {
            return Err(Error::Validation("listing must specify a service".into()));
        }
        if self.host.is_empty() {
            return Err(Error::Validation("listing must specify a host".into()));
        }
        Ok(())
    }

    /// Look up a field by name, treating the typed fields and the opaque
    /// extras uniformly. Used by watch filters.
    pub fn field(&self, key: &str) -> Option<Value> {
        match key {
            "service" => Some(Value::String(self.service.clone())),
            "host" => Some(Value::String(self.host.clone())),
            _ => self.extras.get(key).cloned(),
        }
    }
}
