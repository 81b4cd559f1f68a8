//! Memory Tier Module
//!
//! Fast in-process storage for cache entries with lazy TTL expiration.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;

use crate::cache::{CacheEntry, TierStats};

// == Lookup ==
/// Outcome of a memory-tier read.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Entry present and valid
    Hit(Value),
    /// Entry was present but expired and has been evicted
    Expired,
    /// No entry for the key
    Absent,
}

// == Memory Tier ==
/// In-memory key-value storage.
///
/// Only per-shard synchronization is applied: concurrent writers to the same
/// key race with last-write-wins semantics.
#[derive(Debug, Default)]
pub struct MemoryTier {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryTier {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Get ==
    /// Retrieves a value by key, evicting it if it expired.
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Lookup {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => return Lookup::Hit(entry.value.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            // A concurrent set may have replaced the entry since the read above.
            self.entries.remove_if(key, |_, entry| entry.is_expired_at(now));
            Lookup::Expired
        } else {
            Lookup::Absent
        }
    }

    // == Insert ==
    /// Stores an entry, replacing any previous value and expiry.
    pub fn insert(&self, key: impl Into<String>, entry: CacheEntry) {
        self.entries.insert(key.into(), entry);
    }

    // == Remove ==
    /// Removes an entry. Returns true if one was present.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    // == Clear ==
    pub fn clear(&self) {
        self.entries.clear();
    }

    // == Sweep ==
    /// Removes all entries expired at `now`.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        before.saturating_sub(self.entries.len())
    }

    // == Counts ==
    /// Counts total, valid and expired entries at `now`.
    pub fn counts(&self, now: DateTime<Utc>) -> TierStats {
        let total = self.entries.len() as u64;
        let valid = self
            .entries
            .iter()
            .filter(|entry| !entry.is_expired_at(now))
            .count() as u64;
        TierStats::new(total, valid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
