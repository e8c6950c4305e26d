//! feed.rs: bounded, deduplicated, most-recent-first listing feed.

use std::collections::{HashSet, VecDeque};

use metrics::{counter, gauge};
use parking_lot::Mutex;

use crate::ingest::types::Listing;

#[derive(Debug)]
pub struct FeedStore {
    inner: Mutex<VecDeque<Listing>>,
    cap: usize,
}

impl FeedStore {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Merge a batch and return the accepted listings in batch order.
    ///
    /// A listing is accepted when its link is empty or unseen. Accepted items
    /// go to the front; the oldest items beyond capacity are dropped.
    pub fn merge(&self, batch: Vec<Listing>) -> Vec<Listing> {
        let mut feed = self.inner.lock();

        let mut seen: HashSet<String> = feed
            .iter()
            .filter_map(|l| l.identity().map(str::to_string))
            .collect();

        let accepted: Vec<Listing> = batch
            .into_iter()
            .filter(|l| match l.identity() {
                None => true,
                Some(key) => seen.insert(key.to_string()),
            })
            .collect();

        for l in accepted.iter().rev() {
            feed.push_front(l.clone());
        }
        feed.truncate(self.cap);

        counter!("feed_accepted_total").increment(accepted.len() as u64);
        gauge!("feed_len").set(feed.len() as f64);
        accepted
    }

    pub fn snapshot(&self) -> Vec<Listing> {
        self.inner.lock().iter().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<Listing> {
        self.inner.lock().iter().find(|l| l.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
        gauge!("feed_len").set(0.0);
    }
}
