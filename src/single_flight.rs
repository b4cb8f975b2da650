//! Keyed single-flight registry.
//!
//! At most one guard per key exists at a time. Acquisition never waits: a busy
//! key returns `None` and the caller skips the work.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
pub struct SingleFlight<K: Eq + Hash> {
    busy: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash> Clone for SingleFlight<K> {
    fn clone(&self) -> Self {
        Self {
            busy: Arc::clone(&self.busy),
        }
    }
}

impl<K: Eq + Hash> Default for SingleFlight<K> {
    fn default() -> Self {
        Self {
            busy: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> SingleFlight<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` busy, or returns `None` if it already is.
    pub fn try_acquire(&self, key: K) -> Option<FlightGuard<K>> {
        if !lock(&self.busy).insert(key.clone()) {
            return None;
        }
        Some(FlightGuard {
            busy: Arc::clone(&self.busy),
            key,
        })
    }

    pub fn is_busy(&self, key: &K) -> bool {
        lock(&self.busy).contains(key)
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.busy).len()
    }
}

/// Releases its key when dropped, including on panic unwinding.
#[derive(Debug)]
pub struct FlightGuard<K: Eq + Hash> {
    busy: Arc<Mutex<HashSet<K>>>,
    key: K,
}

impl<K: Eq + Hash> FlightGuard<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash> Drop for FlightGuard<K> {
    fn drop(&mut self) {
        lock(&self.busy).remove(&self.key);
    }
}

// The set stays consistent even if a holder panicked, so poisoning is ignored.
fn lock<K>(busy: &Mutex<HashSet<K>>) -> MutexGuard<'_, HashSet<K>> {
    busy.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
