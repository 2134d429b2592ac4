//! Watch handles and declarative watch configuration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::client::updaters::Updater;
use crate::common::Listing;

/// A periodically refreshed, failure-tolerant view of one service's
/// listings.
///
/// `get()` returns whatever the most recent *successful* refresh produced;
/// transient outages never clear it. `close()` flips a flag the refresh task
/// observes on its next cycle.
pub struct Watch {
    updater: Arc<dyn Updater>,
    open: Arc<AtomicBool>,
}

impl Watch {
    pub(crate) fn new(updater: Arc<dyn Updater>, open: Arc<AtomicBool>) -> Self {
        Self { updater, open }
    }

    /// A watch over a fixed list. Never refreshes, so it works without any
    /// coordinators; useful for local development configs.
    pub fn fixed(listings: Vec<Listing>) -> Self {
        let updater = Arc::new(crate::client::updaters::ListUpdater::new(false));
        updater.update(listings);
        Self {
            updater,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// The current cached listings (possibly a selection, depending on the
    /// updater the watch was built with).
    pub fn get(&self) -> Vec<Listing> {
        self.updater.get()
    }

    /// Stop refreshing. Takes effect on the refresh task's next cycle.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Declarative watch construction for deployment-time configuration.
///
/// ```json
/// { "type": "random", "service": "billing", "numToPull": 2 }
/// { "type": "static", "hosts": [{ "service": "billing", "host": "localhost:9000" }] }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WatchConfig {
    Random {
        service: String,
        /// Exact-match field filters applied before selection.
        #[serde(default)]
        filter: Option<serde_json::Map<String, Value>>,
        #[serde(rename = "numToPull", default)]
        num_to_pull: Option<usize>,
    },
    Static {
        hosts: Vec<Listing>,
    },
}
