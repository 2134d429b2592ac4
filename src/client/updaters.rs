//! Updaters: composable caches over a watch's result set.
//!
//! A watch refresh pushes the latest listings into an [`Updater`]; consumers
//! pull from it with `get()`. Wrappers decorate either side: a filter prunes
//! what goes in, a random selector samples what comes out.

use std::sync::{Arc, Mutex};

use rand::Rng;
use serde_json::Value;

use crate::common::Listing;

pub trait Updater: Send + Sync {
    /// Replace the cached set with the latest successful poll result.
    fn update(&self, listings: Vec<Listing>);

    /// The current cached set (or a selection of it).
    fn get(&self) -> Vec<Listing>;
}

/// Identity cache. Logs listings that appear and disappear between updates
/// when constructed with `log_changes`.
pub struct ListUpdater {
    current: Mutex<Vec<Listing>>,
    log_changes: bool,
}

impl ListUpdater {
    pub fn new(log_changes: bool) -> Self {
        Self {
            current: Mutex::new(Vec::new()),
            log_changes,
        }
    }
}

impl Updater for ListUpdater {
    fn update(&self, listings: Vec<Listing>) {
        let mut current = self.current.lock().unwrap();
        if self.log_changes {
            for old in current.iter() {
                if !listings.contains(old) {
                    tracing::info!("gone is listing for service [{}] host [{}]", old.service, old.host);
                }
            }
            for new in listings.iter() {
                if !current.contains(new) {
                    tracing::info!("new is listing for service [{}] host [{}]", new.service, new.host);
                }
            }
        }
        *current = listings;
    }

    fn get(&self) -> Vec<Listing> {
        self.current.lock().unwrap().clone()
    }
}

/// Wraps an updater so `get()` returns a uniformly random sample of
/// `num_to_pull` listings without replacement.
pub struct RandomUpdater {
    inner: Arc<dyn Updater>,
    num_to_pull: usize,
}

impl RandomUpdater {
    pub fn new(inner: Arc<dyn Updater>, num_to_pull: usize) -> Self {
        Self { inner, num_to_pull }
    }
}

impl Updater for RandomUpdater {
    fn update(&self, listings: Vec<Listing>) {
        self.inner.update(listings);
    }

    fn get(&self) -> Vec<Listing> {
        select_random(&self.inner.get(), self.num_to_pull)
    }
}

/// One predicate of a listing filter: either an exact field match or an
/// arbitrary predicate function.
pub enum FilterPredicate {
    Equals { key: String, value: Value },
    Matches(Box<dyn Fn(&Listing) -> bool + Send + Sync>),
}

impl FilterPredicate {
    fn matches(&self, listing: &Listing) -> bool {
        match self {
            FilterPredicate::Equals { key, value } => {
                listing.field(key).as_ref() == Some(value)
            }
            FilterPredicate::Matches(predicate) => predicate(listing),
        }
    }
}

/// A conjunction of per-field predicates, compiled once at watch
/// construction time.
#[derive(Default)]
pub struct ListingFilter {
    predicates: Vec<FilterPredicate>,
}

impl ListingFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_equals(mut self, key: impl Into<String>, value: Value) -> Self {
        self.predicates.push(FilterPredicate::Equals {
            key: key.into(),
            value,
        });
        self
    }

    pub fn field_matches<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Listing) -> bool + Send + Sync + 'static,
    {
        self.predicates
            .push(FilterPredicate::Matches(Box::new(predicate)));
        self
    }

    pub fn matches(&self, listing: &Listing) -> bool {
        self.predicates.iter().all(|p| p.matches(listing))
    }
}

impl From<serde_json::Map<String, Value>> for ListingFilter {
    /// Each map entry becomes an exact-match predicate.
    fn from(fields: serde_json::Map<String, Value>) -> Self {
        let mut filter = ListingFilter::new();
        for (key, value) in fields {
            filter = filter.field_equals(key, value);
        }
        filter
    }
}

/// Wraps an updater so incoming listings are filtered before being stored.
pub struct FilterUpdater {
    inner: Arc<dyn Updater>,
    filter: ListingFilter,
}

impl FilterUpdater {
    pub fn new(inner: Arc<dyn Updater>, filter: ListingFilter) -> Self {
        Self { inner, filter }
    }
}

impl Updater for FilterUpdater {
    fn update(&self, listings: Vec<Listing>) {
        self.inner.update(
            listings
                .into_iter()
                .filter(|listing| self.filter.matches(listing))
                .collect(),
        );
    }

    fn get(&self) -> Vec<Listing> {
        self.inner.get()
    }
}

/// Pick `num_to_pull` distinct items uniformly at random, clamped to the
/// available count.
///
/// Each draw takes a uniform integer in a shrinking bound and walks the
/// sorted list of prior picks, bumping the draw past each one at or below
/// it. One sorted insert per draw instead of a full shuffle, so selection is
/// O(num_to_pull) in items touched while every subset stays equally likely.
pub fn select_random<T: Clone>(items: &[T], num_to_pull: usize) -> Vec<T> {
    let count = num_to_pull.min(items.len());
    let mut rng = rand::thread_rng();

    let mut picked = Vec::with_capacity(count);
    let mut visited: Vec<usize> = Vec::with_capacity(count);
    let mut bound = items.len();

    for _ in 0..count {
        let mut index = rng.gen_range(0..bound);
        let mut position = 0;
        while position < visited.len() && visited[position] <= index {
            index += 1;
            position += 1;
        }
        visited.insert(position, index);
        picked.push(items[index].clone());
        bound -= 1;
    }
    picked
}
