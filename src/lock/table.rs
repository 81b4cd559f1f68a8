//! Lock Table Module
//!
//! One namespace of lazily created, named async mutexes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, warn};

/// Guard parked in the table while a key is held.
struct Held {
    token: u64,
    _guard: OwnedMutexGuard<()>,
}

// == Lock Table ==
/// Named mutexes plus the guards of the keys currently held.
///
/// Holding the guard inside the table is what lets `release(key)` work from
/// any call site, not just the one that acquired.
pub(crate) struct LockTable {
    /// Label used in log lines ("lock", "response lock")
    kind: &'static str,
    owner: &'static str,
    mutexes: DashMap<String, Arc<Mutex<()>>>,
    held: DashMap<String, Held>,
    next_token: AtomicU64,
}

impl LockTable {
    pub(crate) fn new(owner: &'static str, kind: &'static str) -> Self {
        Self {
            kind,
            owner,
            mutexes: DashMap::new(),
            held: DashMap::new(),
            next_token: AtomicU64::new(1),
        }
    }

    // == Acquire ==
    /// Waits up to `timeout` for `key`. Returns the acquisition token.
    pub(crate) async fn acquire(&self, key: &str, timeout: Duration) -> Option<u64> {
        // Clone the Arc out so no map shard stays locked across the await.
        let mutex = self
            .mutexes
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => {
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                self.held.insert(
                    key.to_string(),
                    Held {
                        token,
                        _guard: guard,
                    },
                );
                debug!("[{}] acquired {} for {}", self.owner, self.kind, key);
                Some(token)
            }
            Err(_) => {
                error!(
                    "[{}] failed to acquire {} for {} within {:?}",
                    self.owner, self.kind, key, timeout
                );
                None
            }
        }
    }

    // == Release ==
    /// Releases whoever currently holds `key`.
    ///
    /// Returns false, with a warning, if the key is not held.
    pub(crate) fn release(&self, key: &str) -> bool {
        if self.held.remove(key).is_some() {
            debug!("[{}] released {} for {}", self.owner, self.kind, key);
            true
        } else {
            warn!(
                "[{}] attempted to release an unlocked {} for {}",
                self.owner, self.kind, key
            );
            false
        }
    }

    /// Releases `key` only if it is still held under `token`.
    pub(crate) fn release_token(&self, key: &str, token: u64) -> bool {
        self.held
            .remove_if(key, |_, held| held.token == token)
            .is_some()
    }

    pub(crate) fn is_held(&self, key: &str) -> bool {
        self.held.contains_key(key)
    }

    // == Maintenance ==
    /// Drops mutexes nobody holds or waits on. Returns how many were dropped.
    pub(crate) fn prune_idle(&self) -> usize {
        let before = self.mutexes.len();
        self.mutexes.retain(|key, mutex| {
            // Holders and waiters each keep a clone of the Arc.
            let idle = Arc::strong_count(mutex) == 1 && !self.held.contains_key(key);
            !idle
        });
        before.saturating_sub(self.mutexes.len())
    }

    /// Forgets every mutex and releases every held key.
    pub(crate) fn clear(&self) {
        self.held.clear();
        self.mutexes.clear();
    }

    pub(crate) fn tracked(&self) -> usize {
        self.mutexes.len()
    }

    pub(crate) fn held(&self) -> usize {
        self.held.len()
    }
}
