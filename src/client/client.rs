//! The mesh client: coordinator discovery, listing publication, and watches.
//!
//! A client learns coordinators by resyncing against the rendezvous host and
//! by pulling each known coordinator's own view (the same gossip pull the
//! coordinators run among themselves). Published listings are heartbeated to
//! every known coordinator; watches read from the head of the coordinator
//! queue and tolerate stale data when that coordinator is down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::client::updaters::{FilterUpdater, ListUpdater, ListingFilter, RandomUpdater, Updater};
use crate::client::watch::{Watch, WatchConfig};
use crate::common::polling::{self, RunOutcome};
use crate::common::{
    CoordinatorDescriptor, CoordinatorRpc, Error, Listing, MeshConfig, Result, RpcFactory,
};

struct ClientState {
    coordinators: HashMap<String, CoordinatorDescriptor>,
    // RPC handles in insertion order; watches read from the head, so a
    // spliced-out failure fails over to the next live peer automatically.
    coord_queue: Vec<Arc<dyn CoordinatorRpc>>,
    publications: Vec<Listing>,
    started: bool,
}

pub struct MeshClient {
    config: MeshConfig,
    self_ref: Weak<Self>,
    rendezvous: Arc<dyn CoordinatorRpc>,
    factory: Arc<dyn RpcFactory>,
    state: Mutex<ClientState>,
}

impl MeshClient {
    /// `config.host` is the rendezvous address this client resyncs against.
    pub fn new(config: MeshConfig, factory: Arc<dyn RpcFactory>) -> Result<Arc<Self>> {
        config.validate()?;
        let rendezvous = factory.client_for(&config.host);
        Ok(Arc::new_cyclic(|self_ref| Self {
            config,
            self_ref: self_ref.clone(),
            rendezvous,
            factory,
            state: Mutex::new(ClientState {
                coordinators: HashMap::new(),
                coord_queue: Vec::new(),
                publications: Vec::new(),
                started: false,
            }),
        }))
    }

    /// Start with an upfront resync: the recurring tasks are only scheduled
    /// if the rendezvous host answers, otherwise the error is returned and
    /// the client stays stopped.
    pub async fn start(&self) -> Result<()> {
        if self.is_started() {
            return Ok(());
        }
        // Flag first: the resync spawns per-coordinator poll tasks whose
        // first run is immediate, and they must see a started client.
        self.state.lock().unwrap().started = true;
        if let Err(err) = self.resync_once().await {
            self.state.lock().unwrap().started = false;
            return Err(err);
        }
        self.start_tasks();
        Ok(())
    }

    /// Optimistic start: schedule the recurring tasks unconditionally and
    /// keep trying even if no coordinator can be found yet.
    pub fn start_detached(&self) {
        if self.is_started() {
            return;
        }
        self.start_tasks();
    }

    /// Stop the client and drop all local state. In-flight tasks observe the
    /// flag and stop on their next cycle.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.started {
            return;
        }
        tracing::info!("stopping mesh client");
        state.started = false;
        state.coordinators.clear();
        state.coord_queue.clear();
        state.publications.clear();
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().unwrap().started
    }

    /// Hosts of the currently known coordinators.
    pub fn coordinator_hosts(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .coordinators
            .keys()
            .cloned()
            .collect()
    }

    /// Listings this client has published so far.
    pub fn publications(&self) -> Vec<Listing> {
        self.state.lock().unwrap().publications.clone()
    }

    /// Publish a listing: record it for periodic re-heartbeats and fan the
    /// first heartbeat out to every known coordinator immediately.
    ///
    /// Individual coordinator failures are logged, not surfaced; the overall
    /// call succeeds once the fan-out completes.
    pub async fn publish(&self, listing: Listing) -> Result<()> {
        listing.validate()?;
        {
            let mut state = self.state.lock().unwrap();
            if !state.started {
                return Err(Error::NotStarted);
            }
            state.publications.push(listing.clone());
        }
        self.publish_listing(&listing).await;
        Ok(())
    }

    /// Heartbeat one listing to every known coordinator concurrently.
    async fn publish_listing(&self, listing: &Listing) {
        let clients = self.state.lock().unwrap().coord_queue.clone();
        let results = futures_util::future::join_all(
            clients.iter().map(|client| client.listing_heartbeat(listing)),
        )
        .await;
        for (client, result) in clients.iter().zip(results) {
            if let Err(err) = result {
                tracing::error!(
                    "error publishing listing for service [{}] to coordinator [{}]: {}",
                    listing.service,
                    client.host(),
                    err
                );
            }
        }
    }

    /// Watch a service with a plain diff-logging cache.
    pub fn watch(&self, service: &str, filter: Option<ListingFilter>) -> Result<Watch> {
        self.watch_with_updater(service, filter, Arc::new(ListUpdater::new(true)))
    }

    /// Watch a service, selecting `num_to_pull` random instances on each
    /// `get()`.
    pub fn random_watch(
        &self,
        service: &str,
        filter: Option<ListingFilter>,
        num_to_pull: usize,
    ) -> Result<Watch> {
        let updater = RandomUpdater::new(Arc::new(ListUpdater::new(true)), num_to_pull);
        self.watch_with_updater(service, filter, Arc::new(updater))
    }

    /// Watch over a fixed listing list; never refreshes.
    pub fn static_watch(&self, hosts: Vec<Listing>) -> Watch {
        Watch::fixed(hosts)
    }

    /// Build a watch from a declarative config record.
    pub fn watch_from_config(&self, config: &WatchConfig) -> Result<Watch> {
        match config {
            WatchConfig::Random {
                service,
                filter,
                num_to_pull,
            } => {
                let filter = filter.clone().map(ListingFilter::from);
                self.random_watch(service, filter, num_to_pull.unwrap_or(1))
            }
            WatchConfig::Static { hosts } => Ok(self.static_watch(hosts.clone())),
        }
    }

    /// Watch a service through a caller-supplied updater. The refresh task
    /// polls the head of the coordinator queue every heartbeat interval and
    /// leaves the cache untouched on failure.
    pub fn watch_with_updater(
        &self,
        service: &str,
        filter: Option<ListingFilter>,
        updater: Arc<dyn Updater>,
    ) -> Result<Watch> {
        if !self.is_started() {
            return Err(Error::NotStarted);
        }

        let updater: Arc<dyn Updater> = match filter {
            Some(filter) => Arc::new(FilterUpdater::new(updater, filter)),
            None => updater,
        };

        tracing::info!("starting watch for service [{}]", service);
        let open = Arc::new(AtomicBool::new(true));

        let client_ref = self.self_ref.clone();
        let task_updater = updater.clone();
        let task_open = open.clone();
        let task_service = service.to_string();
        polling::repeat(
            format!("service-watch-{}", service),
            move || {
                let client_ref = client_ref.clone();
                let updater = task_updater.clone();
                let open = task_open.clone();
                let service = task_service.clone();
                async move {
                    if !open.load(Ordering::SeqCst) {
                        return RunOutcome::Stop;
                    }
                    match client_ref.upgrade() {
                        Some(client) => {
                            if !client.is_started() {
                                return RunOutcome::Fail(Error::NotStarted);
                            }
                            client.refresh_watch_once(&service, updater.as_ref()).await;
                            RunOutcome::Continue
                        }
                        None => RunOutcome::Stop,
                    }
                }
            },
            self.config.heartbeat_interval(),
        );

        Ok(Watch::new(updater, open))
    }

    /// One resync cycle: pull the rendezvous host's coordinator view and
    /// register anything new.
    pub async fn resync_once(&self) -> Result<()> {
        let coordinators = self.rendezvous.get_coordinators().await?;
        for coordinator in coordinators {
            self.register_coordinator(coordinator);
        }
        Ok(())
    }

    /// One re-heartbeat cycle: replay every publication to every known
    /// coordinator.
    pub async fn publish_heartbeats_once(&self) {
        let publications = self.state.lock().unwrap().publications.clone();
        for listing in &publications {
            self.publish_listing(listing).await;
        }
    }

    /// One gossip pull from a known coordinator. On failure that coordinator
    /// is removed and spliced out of the queue and the poll stops.
    pub async fn poll_coordinator_once(
        &self,
        client: Arc<dyn CoordinatorRpc>,
        host: &str,
    ) -> RunOutcome {
        {
            let state = self.state.lock().unwrap();
            if !state.started {
                return RunOutcome::Stop;
            }
            if !state.coordinators.contains_key(host) {
                return RunOutcome::Fail(Error::Other(format!("unknown coordinator [{}]", host)));
            }
        }

        match client.get_coordinators().await {
            Ok(coordinators) => {
                for coordinator in coordinators {
                    self.register_coordinator(coordinator);
                }
                RunOutcome::Continue
            }
            Err(err) => {
                tracing::info!("error talking to coordinator [{}], dropping: {}", host, err);
                self.remove_coordinator(host);
                RunOutcome::Stop
            }
        }
    }

    fn start_tasks(&self) {
        self.state.lock().unwrap().started = true;

        let client_ref = self.self_ref.clone();
        polling::repeat(
            "coordinator-resync",
            move || {
                let client_ref = client_ref.clone();
                async move {
                    let Some(client) = client_ref.upgrade() else {
                        return RunOutcome::Stop;
                    };
                    if !client.is_started() {
                        return RunOutcome::Stop;
                    }
                    if let Err(err) = client.resync_once().await {
                        tracing::info!("unable to resync coordinators: {}", err);
                    }
                    RunOutcome::Continue
                }
            },
            self.config.resync_interval(),
        );

        let client_ref = self.self_ref.clone();
        polling::repeat(
            "service-publishing",
            move || {
                let client_ref = client_ref.clone();
                async move {
                    let Some(client) = client_ref.upgrade() else {
                        return RunOutcome::Stop;
                    };
                    if !client.is_started() {
                        return RunOutcome::Stop;
                    }
                    client.publish_heartbeats_once().await;
                    RunOutcome::Continue
                }
            },
            self.config.heartbeat_interval(),
        );
    }

    /// Register a coordinator and start its gossip poll, unless the host is
    /// already known.
    fn register_coordinator(&self, coordinator: CoordinatorDescriptor) {
        if coordinator.host.is_empty() {
            tracing::warn!("ignoring coordinator descriptor without a host");
            return;
        }

        let host = coordinator.host.clone();
        let client = {
            let mut state = self.state.lock().unwrap();
            if state.coordinators.contains_key(&host) {
                return;
            }
            tracing::info!("adding coordinator [{}]", host);
            let client = self.factory.client_for(&host);
            state.coordinators.insert(host.clone(), coordinator);
            state.coord_queue.push(client.clone());
            client
        };

        let client_ref = self.self_ref.clone();
        polling::repeat(
            format!("coordinator-poller-{}", host),
            move || {
                let client_ref = client_ref.clone();
                let client = client.clone();
                let host = host.clone();
                async move {
                    match client_ref.upgrade() {
                        Some(mesh) => mesh.poll_coordinator_once(client, &host).await,
                        None => RunOutcome::Stop,
                    }
                }
            },
            self.config.poll_interval(),
        );
    }

    fn remove_coordinator(&self, host: &str) {
        tracing::info!("removing coordinator [{}]", host);
        let mut state = self.state.lock().unwrap();
        state.coordinators.remove(host);
        state.coord_queue.retain(|client| client.host() != host);
    }

    /// One watch refresh: pull listings from the head of the coordinator
    /// queue. Failures and an empty queue leave the cache untouched.
    async fn refresh_watch_once(&self, service: &str, updater: &dyn Updater) {
        let head = self.state.lock().unwrap().coord_queue.first().cloned();
        match head {
            None => {
                tracing::warn!(
                    "no known coordinators, not updating listings for service [{}]",
                    service
                );
            }
            Some(client) => match client.get_listings(service).await {
                Ok(listings) => updater.update(listings),
                Err(err) => {
                    tracing::warn!(
                        "error updating listings for service [{}] from host [{}]: {}",
                        service,
                        client.host(),
                        err
                    );
                }
            },
        }
    }
}
