//! Coordinator membership via pull gossip.
//!
//! Each coordinator keeps a local view of every coordinator it knows about,
//! including itself. Membership spreads two ways: a per-peer poll that pulls
//! the peer's own view (transitive gossip), and a slower resync against the
//! rendezvous host that re-seeds the view and re-announces this node if the
//! rendezvous response no longer includes it.
//!
//! An unreachable peer is dropped from the local view only. Its host goes on
//! a blacklist so a stale gossip response from another peer cannot re-add it
//! in the same propagation window; an explicit re-add (rendezvous resync or a
//! POST from the peer itself) clears the blacklist entry.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};

use crate::common::polling::{self, RunOutcome};
use crate::common::{CoordinatorDescriptor, CoordinatorRpc, MeshConfig, Result, RpcFactory};

struct MembershipState {
    known: HashMap<String, CoordinatorDescriptor>,
    blacklist: HashSet<String>,
}

pub struct CoordinatorBroker {
    self_description: CoordinatorDescriptor,
    // Handed to spawned poll tasks; they stop once the broker is gone.
    self_ref: Weak<Self>,
    state: Mutex<MembershipState>,
    resync_client: Arc<dyn CoordinatorRpc>,
    factory: Arc<dyn RpcFactory>,
    heartbeat_interval: std::time::Duration,
    resync_poll_duration: std::time::Duration,
}

impl CoordinatorBroker {
    pub fn new(
        self_description: CoordinatorDescriptor,
        config: &MeshConfig,
        factory: Arc<dyn RpcFactory>,
    ) -> Arc<Self> {
        let mut known = HashMap::new();
        known.insert(self_description.host.clone(), self_description.clone());

        Arc::new_cyclic(|self_ref| Self {
            self_description,
            self_ref: self_ref.clone(),
            state: Mutex::new(MembershipState {
                known,
                blacklist: HashSet::new(),
            }),
            resync_client: factory.client_for(&config.host),
            factory,
            heartbeat_interval: config.heartbeat_interval(),
            resync_poll_duration: config.resync_poll_duration(),
        })
    }

    /// Spawn the rendezvous resync loop. Failures are logged and retried on
    /// the next interval; this task only stops with the broker itself.
    pub fn start_resync(&self) {
        let broker_ref = self.self_ref.clone();
        polling::repeat(
            "resync-coordinators",
            move || {
                let broker_ref = broker_ref.clone();
                async move {
                    match broker_ref.upgrade() {
                        Some(broker) => {
                            broker.resync_once().await;
                            RunOutcome::Continue
                        }
                        None => RunOutcome::Stop,
                    }
                }
            },
            self.resync_poll_duration,
        );
    }

    /// Record a coordinator. A known host has its descriptor replaced in
    /// place; a new host gets an RPC handle and a dedicated gossip poll.
    /// Either way the host is cleared from the blacklist.
    pub fn add_coordinator(&self, coordinator: CoordinatorDescriptor) -> Result<()> {
        coordinator.validate()?;
        tracing::info!("adding coordinator [{}]", coordinator.host);

        let key = coordinator.host.clone();
        let is_new = {
            let mut state = self.state.lock().unwrap();
            let is_new = !state.known.contains_key(&key);
            if !is_new {
                tracing::info!("replacing existing coordinator [{}]", key);
            }
            state.known.insert(key.clone(), coordinator);
            state.blacklist.remove(&key);
            is_new
        };

        if is_new {
            self.spawn_peer_poll(key);
        }
        Ok(())
    }

    /// The current membership view, self included.
    pub fn get_coordinators(&self) -> Vec<CoordinatorDescriptor> {
        self.state.lock().unwrap().known.values().cloned().collect()
    }

    fn spawn_peer_poll(&self, key: String) {
        let client = self.factory.client_for(&key);
        let broker_ref = self.self_ref.clone();
        let name = format!("{} coordinator poll", key);
        polling::repeat(
            name,
            move || {
                let broker_ref = broker_ref.clone();
                let client = client.clone();
                let key = key.clone();
                async move {
                    match broker_ref.upgrade() {
                        Some(broker) => broker.poll_peer_once(client, &key).await,
                        None => RunOutcome::Stop,
                    }
                }
            },
            self.heartbeat_interval,
        );
    }

    /// One gossip pull from a peer. On success every unknown, non-blacklisted
    /// host in the response is added; on failure the peer is dropped and
    /// blacklisted and the poll stops.
    pub async fn poll_peer_once(&self, client: Arc<dyn CoordinatorRpc>, key: &str) -> RunOutcome {
        match client.get_coordinators().await {
            Ok(coordinators) => {
                for coordinator in coordinators {
                    let fresh = {
                        let state = self.state.lock().unwrap();
                        !state.blacklist.contains(&coordinator.host)
                            && !state.known.contains_key(&coordinator.host)
                    };
                    if fresh {
                        if let Err(err) = self.add_coordinator(coordinator) {
                            tracing::warn!("ignoring bad descriptor from [{}]: {}", key, err);
                        }
                    }
                }
                RunOutcome::Continue
            }
            Err(err) => {
                tracing::warn!(
                    "error talking to coordinator [{}], removing: {}",
                    client.host(),
                    err
                );
                let mut state = self.state.lock().unwrap();
                state.known.remove(key);
                state.blacklist.insert(key.to_string());
                RunOutcome::Stop
            }
        }
    }

    /// One resync cycle against the rendezvous host: adopt any coordinators
    /// we do not know yet, and re-announce ourselves if the response no
    /// longer includes us.
    pub async fn resync_once(&self) {
        match self.resync_client.get_coordinators().await {
            Ok(coordinators) => {
                let mut they_know_about_me = false;
                for coordinator in coordinators {
                    if coordinator.host == self.self_description.host {
                        they_know_about_me = true;
                    } else if !self.state.lock().unwrap().known.contains_key(&coordinator.host) {
                        if let Err(err) = self.add_coordinator(coordinator) {
                            tracing::warn!(
                                "ignoring bad descriptor from rendezvous [{}]: {}",
                                self.resync_client.host(),
                                err
                            );
                        }
                    }
                }

                if !they_know_about_me {
                    if let Err(err) = self.resync_client.add_coordinator(&self.self_description).await {
                        tracing::info!(
                            "error adding self to remote coordinator [{}]: {}",
                            self.resync_client.host(),
                            err
                        );
                    }
                }
            }
            Err(err) => {
                tracing::error!(
                    "unable to resync from [{}]: {}",
                    self.resync_client.host(),
                    err
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::rpc::testing::MockRpcFactory;

    const RENDEZVOUS: &str = "rendezvous:8000";

    fn broker(factory: &Arc<MockRpcFactory>, self_host: &str) -> Arc<CoordinatorBroker> {
        let mut config = MeshConfig::new(RENDEZVOUS);
        // Keep background polls quiet for the duration of a test.
        config.heartbeat_interval_ms = 3_600_000;
        CoordinatorBroker::new(
            CoordinatorDescriptor::new(self_host),
            &config,
            factory.clone() as Arc<dyn RpcFactory>,
        )
    }

    fn hosts(broker: &CoordinatorBroker) -> Vec<String> {
        let mut hosts: Vec<String> = broker
            .get_coordinators()
            .into_iter()
            .map(|c| c.host)
            .collect();
        hosts.sort();
        hosts
    }

    #[tokio::test]
    async fn knows_itself_from_the_start() {
        let factory = MockRpcFactory::new();
        let broker = broker(&factory, "a:8000");
        assert_eq!(hosts(&broker), vec!["a:8000"]);
    }

    #[tokio::test]
    async fn resync_adopts_peers_and_announces_self_when_absent() {
        let factory = MockRpcFactory::new();
        let rendezvous = factory.mock_for(RENDEZVOUS);
        rendezvous.set_coordinators(vec![CoordinatorDescriptor::new("b:8000")]);

        let broker = broker(&factory, "a:8000");
        broker.resync_once().await;

        assert_eq!(hosts(&broker), vec!["a:8000", "b:8000"]);
        // The rendezvous response did not include us, so we registered.
        let added = rendezvous.added.lock().unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].host, "a:8000");
    }

    #[tokio::test]
    async fn resync_skips_self_announcement_when_already_listed() {
        let factory = MockRpcFactory::new();
        let rendezvous = factory.mock_for(RENDEZVOUS);
        rendezvous.set_coordinators(vec![
            CoordinatorDescriptor::new("a:8000"),
            CoordinatorDescriptor::new("b:8000"),
        ]);

        let broker = broker(&factory, "a:8000");
        broker.resync_once().await;

        assert_eq!(hosts(&broker), vec!["a:8000", "b:8000"]);
        assert!(rendezvous.added.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resync_failure_changes_nothing() {
        let factory = MockRpcFactory::new();
        factory.mock_for(RENDEZVOUS).set_unreachable(true);

        let broker = broker(&factory, "a:8000");
        broker.resync_once().await;
        assert_eq!(hosts(&broker), vec!["a:8000"]);
    }

    #[tokio::test]
    async fn add_is_idempotent_on_host_and_keeps_latest_descriptor() {
        let factory = MockRpcFactory::new();
        let broker = broker(&factory, "a:8000");

        broker
            .add_coordinator(CoordinatorDescriptor::new("b:8000"))
            .unwrap();
        let mut replacement = CoordinatorDescriptor::new("b:8000");
        replacement
            .extras
            .insert("name".into(), serde_json::json!("b-v2"));
        broker.add_coordinator(replacement.clone()).unwrap();

        let known: Vec<_> = broker
            .get_coordinators()
            .into_iter()
            .filter(|c| c.host == "b:8000")
            .collect();
        assert_eq!(known, vec![replacement]);
    }

    #[tokio::test]
    async fn peer_failure_drops_and_blacklists_only_that_peer() {
        let factory = MockRpcFactory::new();
        let broker = broker(&factory, "a:8000");
        broker
            .add_coordinator(CoordinatorDescriptor::new("b:8000"))
            .unwrap();
        broker
            .add_coordinator(CoordinatorDescriptor::new("c:8000"))
            .unwrap();

        let b = factory.mock_for("b:8000");
        b.set_unreachable(true);
        let outcome = broker.poll_peer_once(b.clone(), "b:8000").await;
        assert!(matches!(outcome, RunOutcome::Stop));
        assert_eq!(hosts(&broker), vec!["a:8000", "c:8000"]);

        // Peer gossip offering the blacklisted host is suppressed.
        let c = factory.mock_for("c:8000");
        c.set_coordinators(vec![
            CoordinatorDescriptor::new("b:8000"),
            CoordinatorDescriptor::new("d:8000"),
        ]);
        let outcome = broker.poll_peer_once(c.clone(), "c:8000").await;
        assert!(matches!(outcome, RunOutcome::Continue));
        assert_eq!(hosts(&broker), vec!["a:8000", "c:8000", "d:8000"]);

        // An explicit re-add clears the blacklist entry.
        broker
            .add_coordinator(CoordinatorDescriptor::new("b:8000"))
            .unwrap();
        assert_eq!(hosts(&broker), vec!["a:8000", "b:8000", "c:8000", "d:8000"]);
    }

    #[tokio::test]
    async fn gossip_pull_adds_transitive_peers() {
        let factory = MockRpcFactory::new();
        let broker = broker(&factory, "a:8000");
        broker
            .add_coordinator(CoordinatorDescriptor::new("b:8000"))
            .unwrap();

        let b = factory.mock_for("b:8000");
        b.set_coordinators(vec![
            CoordinatorDescriptor::new("b:8000"),
            CoordinatorDescriptor::new("c:8000"),
        ]);
        broker.poll_peer_once(b.clone(), "b:8000").await;
        assert_eq!(hosts(&broker), vec!["a:8000", "b:8000", "c:8000"]);
    }
}
