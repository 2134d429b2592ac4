//! RPC client for talking to coordinator nodes.
//!
//! The mesh core only sees the [`CoordinatorRpc`] trait; the HTTP
//! implementation lives here too, speaking the `/v1` wire contract. Brokers
//! and clients get their handles from an injected [`RpcFactory`] so tests can
//! substitute mocks.

use std::sync::Arc;

use async_trait::async_trait;

use crate::common::{CoordinatorDescriptor, Error, Listing, Result};

/// Per-remote-host handle for the coordinator wire protocol.
#[async_trait]
pub trait CoordinatorRpc: Send + Sync {
    /// The remote host this handle talks to.
    fn host(&self) -> &str;

    async fn get_coordinators(&self) -> Result<Vec<CoordinatorDescriptor>>;

    async fn add_coordinator(&self, coordinator: &CoordinatorDescriptor) -> Result<()>;

    /// Listings for a service. An unknown service reads as an empty list;
    /// watches treat the two the same way.
    async fn get_listings(&self, service: &str) -> Result<Vec<Listing>>;

    async fn listing_heartbeat(&self, listing: &Listing) -> Result<()>;
}

/// Creates RPC handles for remote hosts.
pub trait RpcFactory: Send + Sync {
    fn client_for(&self, host: &str) -> Arc<dyn CoordinatorRpc>;
}

/// HTTP+JSON implementation of the coordinator protocol.
pub struct HttpCoordinatorClient {
    host: String,
    http: reqwest::Client,
}

impl HttpCoordinatorClient {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            http: reqwest::Client::new(),
        }
    }

    fn with_http(host: &str, http: reqwest::Client) -> Self {
        Self {
            host: host.to_string(),
            http,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.host, path)
    }

    fn transport_err(&self, err: reqwest::Error) -> Error {
        Error::unavailable(&self.host, err)
    }

    fn status_err(&self, status: reqwest::StatusCode, body: String) -> Error {
        Error::unavailable(&self.host, format!("status {}: {}", status, body.trim()))
    }

    /// Names of all services with live listings. Not part of the core
    /// protocol; the CLI uses it for browsing.
    pub async fn get_services(&self) -> Result<Vec<String>> {
        let response = self
            .http
            .get(self.url("/v1/listings"))
            .send()
            .await
            .map_err(|e| self.transport_err(e))?;

        if response.status() != reqwest::StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(self.status_err(status, body));
        }
        response.json().await.map_err(|e| self.transport_err(e))
    }
}

#[async_trait]
impl CoordinatorRpc for HttpCoordinatorClient {
    fn host(&self) -> &str {
        &self.host
    }

    async fn get_coordinators(&self) -> Result<Vec<CoordinatorDescriptor>> {
        let response = self
            .http
            .get(self.url("/v1/coordinator"))
            .send()
            .await
            .map_err(|e| self.transport_err(e))?;

        if response.status() != reqwest::StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(self.status_err(status, body));
        }
        response.json().await.map_err(|e| self.transport_err(e))
    }

    async fn add_coordinator(&self, coordinator: &CoordinatorDescriptor) -> Result<()> {
        let response = self
            .http
            .post(self.url("/v1/coordinator"))
            .json(coordinator)
            .send()
            .await
            .map_err(|e| self.transport_err(e))?;

        if response.status() != reqwest::StatusCode::CREATED {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(self.status_err(status, body));
        }
        Ok(())
    }

    async fn get_listings(&self, service: &str) -> Result<Vec<Listing>> {
        let response = self
            .http
            .get(self.url(&format!("/v1/listings/{}", service)))
            .send()
            .await
            .map_err(|e| self.transport_err(e))?;

        match response.status() {
            reqwest::StatusCode::OK => response.json().await.map_err(|e| self.transport_err(e)),
            reqwest::StatusCode::NOT_FOUND => Ok(Vec::new()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(self.status_err(status, body))
            }
        }
    }

    async fn listing_heartbeat(&self, listing: &Listing) -> Result<()> {
        listing.validate()?;

        let response = self
            .http
            .post(self.url("/v1/listings"))
            .query(&[("heartbeat", "true")])
            .json(listing)
            .send()
            .await
            .map_err(|e| self.transport_err(e))?;

        if response.status() != reqwest::StatusCode::CREATED {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(self.status_err(status, body));
        }
        Ok(())
    }
}

/// Factory producing HTTP handles sharing one connection pool.
pub struct HttpRpcFactory {
    http: reqwest::Client,
}

impl HttpRpcFactory {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpRpcFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcFactory for HttpRpcFactory {
    fn client_for(&self, host: &str) -> Arc<dyn CoordinatorRpc> {
        Arc::new(HttpCoordinatorClient::with_http(host, self.http.clone()))
    }
}

#[cfg(test)]
pub mod testing {
    //! Scriptable in-memory RPC doubles shared by broker and client tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    pub struct MockRpc {
        host: String,
        /// What `get_coordinators` answers while healthy.
        pub coordinators: Mutex<Vec<CoordinatorDescriptor>>,
        /// What `get_listings` answers while healthy, keyed by service.
        pub listings: Mutex<HashMap<String, Vec<Listing>>>,
        /// Descriptors received through `add_coordinator`.
        pub added: Mutex<Vec<CoordinatorDescriptor>>,
        /// Listings received through `listing_heartbeat`.
        pub heartbeats: Mutex<Vec<Listing>>,
        /// When set, every call fails with RemoteUnavailable.
        pub unreachable: AtomicBool,
    }

    impl MockRpc {
        pub fn new(host: &str) -> Arc<Self> {
            Arc::new(Self {
                host: host.to_string(),
                coordinators: Mutex::new(Vec::new()),
                listings: Mutex::new(HashMap::new()),
                added: Mutex::new(Vec::new()),
                heartbeats: Mutex::new(Vec::new()),
                unreachable: AtomicBool::new(false),
            })
        }

        pub fn set_coordinators(&self, coordinators: Vec<CoordinatorDescriptor>) {
            *self.coordinators.lock().unwrap() = coordinators;
        }

        pub fn set_listings(&self, service: &str, listings: Vec<Listing>) {
            self.listings
                .lock()
                .unwrap()
                .insert(service.to_string(), listings);
        }

        pub fn set_unreachable(&self, down: bool) {
            self.unreachable.store(down, Ordering::SeqCst);
        }

        fn check_reachable(&self) -> Result<()> {
            if self.unreachable.load(Ordering::SeqCst) {
                Err(Error::unavailable(&self.host, "connection refused"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CoordinatorRpc for MockRpc {
        fn host(&self) -> &str {
            &self.host
        }

        async fn get_coordinators(&self) -> Result<Vec<CoordinatorDescriptor>> {
            self.check_reachable()?;
            Ok(self.coordinators.lock().unwrap().clone())
        }

        async fn add_coordinator(&self, coordinator: &CoordinatorDescriptor) -> Result<()> {
            self.check_reachable()?;
            self.added.lock().unwrap().push(coordinator.clone());
            Ok(())
        }

        async fn get_listings(&self, service: &str) -> Result<Vec<Listing>> {
            self.check_reachable()?;
            Ok(self
                .listings
                .lock()
                .unwrap()
                .get(service)
                .cloned()
                .unwrap_or_default())
        }

        async fn listing_heartbeat(&self, listing: &Listing) -> Result<()> {
            self.check_reachable()?;
            self.heartbeats.lock().unwrap().push(listing.clone());
            Ok(())
        }
    }

    /// Factory handing out one shared mock per host.
    pub struct MockRpcFactory {
        clients: Mutex<HashMap<String, Arc<MockRpc>>>,
    }

    impl MockRpcFactory {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                clients: Mutex::new(HashMap::new()),
            })
        }

        /// The mock for a host, creating an empty healthy one on first use.
        pub fn mock_for(&self, host: &str) -> Arc<MockRpc> {
            self.clients
                .lock()
                .unwrap()
                .entry(host.to_string())
                .or_insert_with(|| MockRpc::new(host))
                .clone()
        }
    }

    impl RpcFactory for MockRpcFactory {
        fn client_for(&self, host: &str) -> Arc<dyn CoordinatorRpc> {
            self.mock_for(host)
        }
    }
}
