//! Lock Registry Module
//!
//! Named mutual exclusion for logical resources with bounded waits, plus a
//! second namespace that guards replying to a request at most once.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};

use super::table::LockTable;
use super::{RequestOrigin, ResponseOutcome};

/// Default wait for a resource lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait for a response lock.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long an answered request is remembered.
pub const ANSWERED_RETENTION: Duration = Duration::from_secs(15 * 60);

// == Key Guard ==
/// Holds one key of a registry. The key is released when the guard drops.
///
/// A guard whose key was already released through `LockRegistry::release`
/// leaves any later holder alone.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct KeyGuard {
    table: Arc<LockTable>,
    key: String,
    token: u64,
}

impl KeyGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Releases the key now.
    pub fn release(self) {}
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        self.table.release_token(&self.key, self.token);
    }
}

impl std::fmt::Debug for KeyGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyGuard").field("key", &self.key).finish()
    }
}

// == Multi Guard ==
/// Several keys acquired together in canonical order.
#[must_use = "the locks are released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct MultiGuard {
    guards: Vec<KeyGuard>,
}

impl MultiGuard {
    /// Keys in the order they were acquired.
    pub fn keys(&self) -> Vec<&str> {
        self.guards.iter().map(KeyGuard::key).collect()
    }
}

impl Drop for MultiGuard {
    fn drop(&mut self) {
        // Release in reverse acquisition order.
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

// == Lock Stats ==
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LockStats {
    /// Resource mutexes currently tracked
    pub tracked: usize,
    /// Resource keys currently held
    pub held: usize,
    pub response_tracked: usize,
    pub response_held: usize,
    /// Requests remembered as answered
    pub answered: usize,
}

// == Lock Registry ==
/// Per-owner registry of named async mutexes.
///
/// Lock scope is the registry instance: two registries hand out independent
/// mutexes for the same key. Clones share state.
#[derive(Clone)]
pub struct LockRegistry {
    owner: &'static str,
    locks: Arc<LockTable>,
    responses: Arc<LockTable>,
    answered: Arc<DashMap<String, Instant>>,
    lock_timeout: Duration,
    response_timeout: Duration,
}

impl LockRegistry {
    /// Creates an empty registry. `owner` names it in log lines.
    pub fn new(owner: &'static str) -> Self {
        Self {
            owner,
            locks: Arc::new(LockTable::new(owner, "lock")),
            responses: Arc::new(LockTable::new(owner, "response lock")),
            answered: Arc::new(DashMap::new()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    /// Overrides the default waits.
    #[must_use]
    pub fn with_timeouts(mut self, lock_timeout: Duration, response_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self.response_timeout = response_timeout;
        self
    }

    pub fn owner(&self) -> &'static str {
        self.owner
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    // == Acquire ==
    /// Acquires `key` with the registry's default wait.
    pub async fn acquire(&self, key: &str) -> Option<KeyGuard> {
        self.acquire_timeout(key, self.lock_timeout).await
    }

    /// Acquires `key`, waiting at most `timeout`.
    ///
    /// `None` means the resource is busy; the caller must not go ahead.
    pub async fn acquire_timeout(&self, key: &str, timeout: Duration) -> Option<KeyGuard> {
        let token = self.locks.acquire(key, timeout).await?;
        Some(KeyGuard {
            table: Arc::clone(&self.locks),
            key: key.to_string(),
            token,
        })
    }

    /// Acquires every key in `keys`, all or nothing.
    ///
    /// Keys are deduplicated and taken in sorted order so two callers
    /// locking overlapping sets cannot deadlock. `timeout` bounds the whole
    /// operation.
    pub async fn acquire_many<I, S>(&self, keys: I, timeout: Duration) -> Option<MultiGuard>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();

        let deadline = Instant::now() + timeout;
        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let remaining = deadline.saturating_duration_since(Instant::now());
            // Dropping `guards` on failure releases what was taken so far.
            guards.push(self.acquire_timeout(key, remaining).await?);
        }

        Some(MultiGuard { guards })
    }

    // == Release ==
    /// Releases `key`. Releasing an unheld or unknown key only logs a warning.
    pub fn release(&self, key: &str) {
        self.locks.release(key);
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.locks.is_held(key)
    }

    // == Response Locks ==
    /// Acquires the response lock of `origin` with the default wait.
    pub async fn acquire_response(&self, origin: &RequestOrigin) -> bool {
        self.acquire_response_timeout(origin, self.response_timeout)
            .await
    }

    /// Acquires the response lock of `origin`, waiting at most `timeout`.
    ///
    /// Pair with `release_response`.
    pub async fn acquire_response_timeout(&self, origin: &RequestOrigin, timeout: Duration) -> bool {
        self.responses.acquire(&origin.key(), timeout).await.is_some()
    }

    /// Releases the response lock of `origin`; a no-op if not held.
    pub fn release_response(&self, origin: &RequestOrigin) {
        self.responses.release(&origin.key());
    }

    /// Runs `send` unless `origin` was already answered.
    ///
    /// Concurrent attempts for the same origin are serialized on its response
    /// lock; the first to get through sends, later ones are suppressed.
    pub async fn respond_once<T, F, Fut>(
        &self,
        origin: &RequestOrigin,
        timeout: Duration,
        send: F,
    ) -> ResponseOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let key = origin.key();
        let Some(token) = self.responses.acquire(&key, timeout).await else {
            return ResponseOutcome::TimedOut;
        };
        let _guard = KeyGuard {
            table: Arc::clone(&self.responses),
            key: key.clone(),
            token,
        };

        if self.answered.contains_key(&key) {
            debug!("[{}] suppressed duplicate response for {}", self.owner, key);
            return ResponseOutcome::Suppressed;
        }

        let sent = send().await;
        self.answered.insert(key, Instant::now());
        ResponseOutcome::Sent(sent)
    }

    // == Maintenance ==
    /// Drops idle resource and response mutexes and forgets old answers.
    ///
    /// Returns the number of mutexes dropped.
    pub fn prune_idle(&self) -> usize {
        self.answered
            .retain(|_, answered_at| answered_at.elapsed() < ANSWERED_RETENTION);
        self.locks.prune_idle() + self.responses.prune_idle()
    }

    /// Forgets every tracked lock. Only for owner teardown, when nothing is
    /// in flight.
    pub fn cleanup(&self) {
        if self.locks.held() + self.responses.held() > 0 {
            warn!("[{}] cleanup while locks are still held", self.owner);
        }
        self.locks.clear();
        self.responses.clear();
        self.answered.clear();
    }

    pub fn stats(&self) -> LockStats {
        LockStats {
            tracked: self.locks.tracked(),
            held: self.locks.held(),
            response_tracked: self.responses.tracked(),
            response_held: self.responses.held(),
            answered: self.answered.len(),
        }
    }
}

impl std::fmt::Debug for LockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockRegistry")
            .field("owner", &self.owner)
            .field("stats", &self.stats())
            .finish()
    }
}
