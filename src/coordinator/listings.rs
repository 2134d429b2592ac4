//! Heartbeat-expiring registry of service listings.
//!
//! Each coordinator holds its own registry; nothing is replicated. Publishers
//! keep their listings alive by heartbeating, and a periodic sweep evicts
//! anything that has missed too many heartbeats.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::common::polling::{self, RunOutcome};
use crate::common::{Clock, Listing, MeshConfig, Result};

struct ListingEntry {
    payload: Listing,
    last_heartbeat: u64,
}

pub struct ListingsBroker {
    // service -> host -> entry
    listings: Mutex<HashMap<String, HashMap<String, ListingEntry>>>,
    heartbeat_interval: std::time::Duration,
    ttl_ms: u64,
    log_heartbeats: bool,
    clock: Arc<dyn Clock>,
}

impl ListingsBroker {
    pub fn new(config: &MeshConfig, clock: Arc<dyn Clock>) -> Self {
        tracing::info!(
            "creating listings broker: heartbeat_interval={}ms missed_heartbeats_allowed={}",
            config.heartbeat_interval_ms,
            config.missed_heartbeats_allowed
        );
        Self {
            listings: Mutex::new(HashMap::new()),
            heartbeat_interval: config.heartbeat_interval(),
            ttl_ms: config.listing_ttl_ms(),
            log_heartbeats: config.log_heartbeats,
            clock,
        }
    }

    /// Spawn the periodic TTL sweep. Runs every heartbeat interval for the
    /// lifetime of the broker.
    pub fn start_sweeper(self: Arc<Self>) {
        let interval = self.heartbeat_interval;
        polling::repeat(
            "heartbeat-checker",
            move || {
                let broker = self.clone();
                async move {
                    broker.sweep();
                    RunOutcome::Continue
                }
            },
            interval,
        );
    }

    /// Create or replace the entry for `(service, host)` and stamp its
    /// heartbeat.
    pub fn add_listing(&self, listing: Listing) -> Result<()> {
        listing.validate()?;
        tracing::info!(
            "adding listing for service [{}] host [{}]",
            listing.service,
            listing.host
        );

        let now = self.clock.now_millis();
        let mut listings = self.listings.lock().unwrap();
        let hosts = listings.entry(listing.service.clone()).or_default();
        if let Some(existing) = hosts.get(&listing.host) {
            tracing::info!(
                "replacing existing listing for service [{}] host [{}]",
                existing.payload.service,
                existing.payload.host
            );
        }
        hosts.insert(
            listing.host.clone(),
            ListingEntry {
                payload: listing,
                last_heartbeat: now,
            },
        );
        Ok(())
    }

    /// Stamp the heartbeat for `(service, host)`, creating the entry if this
    /// is the first sighting.
    pub fn listing_heartbeat(&self, listing: Listing) -> Result<()> {
        listing.validate()?;
        if self.log_heartbeats {
            tracing::info!(
                "heartbeat for service [{}] host [{}]",
                listing.service,
                listing.host
            );
        }

        {
            let mut listings = self.listings.lock().unwrap();
            if let Some(entry) = listings
                .get_mut(&listing.service)
                .and_then(|hosts| hosts.get_mut(&listing.host))
            {
                // Never move a heartbeat backwards, even if the clock does.
                entry.last_heartbeat = entry.last_heartbeat.max(self.clock.now_millis());
                return Ok(());
            }
        }
        self.add_listing(listing)
    }

    /// Service names with at least one live entry.
    pub fn get_services(&self) -> Vec<String> {
        self.listings.lock().unwrap().keys().cloned().collect()
    }

    /// Listings for a service, or `None` if the service key itself is
    /// unknown. An unknown service is distinct from a known-but-empty one;
    /// the sweep removes empty services so the latter never lingers.
    pub fn get_service_listings(&self, service: &str) -> Option<Vec<Listing>> {
        self.listings
            .lock()
            .unwrap()
            .get(service)
            .map(|hosts| hosts.values().map(|entry| entry.payload.clone()).collect())
    }

    /// Evict every entry that has missed more heartbeats than allowed. A
    /// heartbeat exactly at the cutoff boundary survives.
    pub fn sweep(&self) {
        let cutoff = self.clock.now_millis().saturating_sub(self.ttl_ms);
        let mut listings = self.listings.lock().unwrap();
        listings.retain(|service, hosts| {
            hosts.retain(|host, entry| {
                let keep = entry.last_heartbeat >= cutoff;
                if !keep {
                    tracing::info!("dropping service [{}] host [{}]", service, host);
                }
                keep
            });
            !hosts.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::time::testing::ManualClock;
    use serde_json::json;

    const HEARTBEAT: u64 = 60_000;

    fn broker_with_clock() -> (ListingsBroker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let mut config = MeshConfig::new("rendezvous:8000");
        config.heartbeat_interval_ms = HEARTBEAT;
        config.missed_heartbeats_allowed = 3;
        (ListingsBroker::new(&config, clock.clone()), clock)
    }

    #[test]
    fn starts_with_no_listings() {
        let (broker, _clock) = broker_with_clock();
        assert!(broker.get_services().is_empty());
        assert!(broker.get_service_listings("anything").is_none());
    }

    #[test]
    fn add_and_fetch() {
        let (broker, _clock) = broker_with_clock();
        let listing = Listing::new("billing", "billing-1:9000");
        broker.add_listing(listing.clone()).unwrap();

        assert_eq!(broker.get_services(), vec!["billing".to_string()]);
        assert_eq!(broker.get_service_listings("billing"), Some(vec![listing]));
    }

    #[test]
    fn heartbeat_creates_unknown_listing() {
        let (broker, _clock) = broker_with_clock();
        let listing = Listing::new("billing", "billing-1:9000");
        broker.listing_heartbeat(listing.clone()).unwrap();
        assert_eq!(broker.get_service_listings("billing"), Some(vec![listing]));
    }

    #[test]
    fn re_add_replaces_payload() {
        let (broker, _clock) = broker_with_clock();
        broker
            .add_listing(Listing::new("billing", "billing-1:9000").with_extra("v", json!(1)))
            .unwrap();
        let updated = Listing::new("billing", "billing-1:9000").with_extra("v", json!(2));
        broker.add_listing(updated.clone()).unwrap();

        assert_eq!(broker.get_service_listings("billing"), Some(vec![updated]));
    }

    #[test]
    fn rejects_incomplete_listings() {
        let (broker, _clock) = broker_with_clock();
        assert!(broker.add_listing(Listing::new("", "h")).is_err());
        assert!(broker.listing_heartbeat(Listing::new("s", "")).is_err());
        assert!(broker.get_services().is_empty());
    }

    #[test]
    fn sweep_honors_exact_cutoff_boundary() {
        let (broker, clock) = broker_with_clock();
        broker.add_listing(Listing::new("billing", "billing-1:9000")).unwrap();

        // Exactly heartbeat_interval * missed_heartbeats_allowed later: survives.
        clock.set(HEARTBEAT * 3);
        broker.sweep();
        assert_eq!(broker.get_services(), vec!["billing".to_string()]);

        // One millisecond past the boundary: evicted, service key removed.
        clock.set(HEARTBEAT * 3 + 1);
        broker.sweep();
        assert!(broker.get_services().is_empty());
        assert!(broker.get_service_listings("billing").is_none());
    }

    #[test]
    fn heartbeats_extend_lifetime_independently_per_host() {
        let (broker, clock) = broker_with_clock();
        let first = Listing::new("billing", "billing-1:9000");
        let second = Listing::new("billing", "billing-2:9000");

        broker.add_listing(first.clone()).unwrap();
        clock.set(HEARTBEAT * 10);
        broker.add_listing(second.clone()).unwrap();

        // First is long expired, second is fresh.
        clock.set(HEARTBEAT * 10 + 1);
        broker.sweep();
        assert_eq!(
            broker.get_service_listings("billing"),
            Some(vec![second.clone()])
        );

        // A heartbeat at t=13 intervals keeps the survivor alive past t=16.
        clock.set(HEARTBEAT * 13);
        broker.listing_heartbeat(second.clone()).unwrap();
        clock.set(HEARTBEAT * 16);
        broker.sweep();
        assert_eq!(broker.get_service_listings("billing"), Some(vec![second]));

        clock.set(HEARTBEAT * 16 + 1);
        broker.sweep();
        assert!(broker.get_services().is_empty());
    }

    #[test]
    fn heartbeat_never_moves_backwards() {
        let (broker, clock) = broker_with_clock();
        clock.set(HEARTBEAT);
        let listing = Listing::new("billing", "billing-1:9000");
        broker.add_listing(listing.clone()).unwrap();

        // Clock steps backwards; the stamp must not regress, so the entry
        // still survives a sweep relative to its original stamp.
        clock.set(0);
        broker.listing_heartbeat(listing).unwrap();
        clock.set(HEARTBEAT * 4);
        broker.sweep();
        assert_eq!(broker.get_services(), vec!["billing".to_string()]);
    }
}
