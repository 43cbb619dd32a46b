//! Trailing-edge event coalescing.
//!
//! Editors and build tools emit bursts of filesystem events for a single
//! logical save. The debouncer absorbs a burst into one deadline per key and
//! releases the key only once the burst has been quiet for the full window.
//! Purely time-parameterized so tests drive it with a fake clock.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Debouncer<K> {
    window: Duration,
    pending: BTreeMap<K, Instant>,
}

impl<K: Ord + Clone> Debouncer<K> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: BTreeMap::new(),
        }
    }

    /// Record an event for `key` at `now`, extending its quiet deadline.
    pub fn record(&mut self, key: K, now: Instant) {
        self.pending.insert(key, now + self.window);
    }

    /// The earliest deadline among pending keys, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Remove and return every key whose quiet window has elapsed at `now`.
    pub fn take_due(&mut self, now: Instant) -> Vec<K> {
        let due: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &due {
            self.pending.remove(key);
        }
        due
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
