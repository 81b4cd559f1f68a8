//! Cache Manager Module
//!
//! Two-tier cache combining the memory tier with the optional durable tier.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::cache::{
    CacheEntry, CacheStats, DurableTier, Lookup, MemoryTier, ReadCounters, SqliteTier, StoredRow,
};
use crate::clock::{Clock, SystemClock};
use crate::db::Database;
use crate::error::{CacheError, StoreError};

/// TTL applied when the caller has no better idea.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

// == Tier ==
/// Where a `set` should write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tier {
    /// Memory only; lost on restart
    #[default]
    Memory,
    /// Memory plus the durable table; survives restart until expiry
    Durable,
}

// == Cleanup Report ==
/// Result of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub memory_removed: usize,
    /// `None` when the durable sweep failed
    pub durable_removed: Option<u64>,
}

// == Cache Manager ==
/// Process-wide cache shared by every service.
///
/// Construct one at startup and hand out `Arc<CacheManager>` clones. No
/// public operation returns an error: store failures are logged and turned
/// into a miss, `false`, or a missing statistics segment.
pub struct CacheManager {
    memory: MemoryTier,
    durable: Arc<dyn DurableTier>,
    /// Serializes every call into the durable tier
    durable_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
    counters: ReadCounters,
    default_ttl: Duration,
}

impl CacheManager {
    // == Constructors ==
    pub fn new(durable: Arc<dyn DurableTier>) -> Self {
        Self::with_clock(durable, Arc::new(SystemClock))
    }

    pub fn with_clock(durable: Arc<dyn DurableTier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            memory: MemoryTier::new(),
            durable,
            durable_lock: Mutex::new(()),
            clock,
            counters: ReadCounters::new(),
            default_ttl: DEFAULT_TTL,
        }
    }

    /// Cache whose durable tier is the `cache_table` of `db`.
    pub fn sqlite(db: Database) -> Self {
        Self::new(Arc::new(SqliteTier::new(db)))
    }

    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Direct access to the memory tier.
    pub fn memory(&self) -> &MemoryTier {
        &self.memory
    }

    // == Get ==
    /// Looks `key` up in memory, then in the durable tier.
    ///
    /// A valid durable row is promoted into memory before it is returned. An
    /// expired durable row is deleted.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();

        if let Lookup::Hit(value) = self.memory.get(key, now) {
            self.counters.record_hit();
            debug!("Cache hit (memory): {}", key);
            return Some(value);
        }

        match self.read_durable(key, now).await {
            Ok(Some(value)) => Some(value),
            Ok(None) => {
                self.counters.record_miss();
                None
            }
            Err(err) => {
                self.counters.record_miss();
                error!("Cache get failed for {}: {}", key, err);
                None
            }
        }
    }

    /// Like `get`, returning `default` on a miss.
    pub async fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).await.unwrap_or(default)
    }

    /// Typed `get`. A value of the wrong shape counts as a miss.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(err) => {
                warn!("Cached value for {} has unexpected shape: {}", key, err);
                None
            }
        }
    }

    async fn read_durable(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Value>, CacheError> {
        let _guard = self.durable_lock.lock().await;

        let Some(row) = self.durable.fetch(key).await? else {
            return Ok(None);
        };

        if now >= row.expires_at {
            self.durable.remove(key).await?;
            debug!("Purged expired durable entry: {}", key);
            return Ok(None);
        }

        match decode(key, &row.value) {
            Ok(value) => {
                self.memory
                    .insert(key, CacheEntry::restored(value.clone(), now, row.expires_at));
                self.counters.record_promotion();
                debug!("Cache hit (durable): {}", key);
                Ok(Some(value))
            }
            Err(err) => {
                // Served raw and not promoted.
                warn!("{}; returning raw value", err);
                self.counters.record_hit();
                Ok(Some(Value::String(row.value)))
            }
        }
    }

    // == Set ==
    /// Stores `value` for `ttl`.
    ///
    /// Memory is always written. With `Tier::Durable` the row is also upserted
    /// into the durable tier; if that fails the result is `false` but the
    /// memory entry stays.
    pub async fn set(&self, key: &str, value: Value, ttl: Duration, tier: Tier) -> bool {
        let entry = CacheEntry::new(value, self.clock.now(), ttl);

        let row = match tier {
            Tier::Memory => None,
            Tier::Durable => Some(encode(&entry)),
        };

        self.memory.insert(key, entry);

        let Some(row) = row else {
            debug!("Cache set (memory): {}", key);
            return true;
        };

        let written = match row {
            Ok(row) => {
                let _guard = self.durable_lock.lock().await;
                self.durable.upsert(key, row).await.map_err(CacheError::from)
            }
            Err(err) => Err(CacheError::from(err)),
        };

        match written {
            Ok(()) => {
                debug!("Cache set (durable): {}", key);
                true
            }
            Err(err) => {
                error!("Durable cache write failed for {}: {}", key, err);
                false
            }
        }
    }

    /// Memory-only `set` with the default TTL.
    pub async fn put(&self, key: &str, value: Value) -> bool {
        self.set(key, value, self.default_ttl, Tier::Memory).await
    }

    /// Typed `set`.
    pub async fn set_as<T: Serialize>(&self, key: &str, value: &T, ttl: Duration, tier: Tier) -> bool {
        match serde_json::to_value(value) {
            Ok(value) => self.set(key, value, ttl, tier).await,
            Err(err) => {
                error!("Failed to serialize value for {}: {}", key, err);
                false
            }
        }
    }

    // == Delete ==
    /// Removes `key` from both tiers. Deleting a missing key succeeds.
    pub async fn delete(&self, key: &str) -> bool {
        self.memory.remove(key);

        let _guard = self.durable_lock.lock().await;
        let removed = self.durable.remove(key).await;
        // Drop anything a concurrent read promoted before we got the lock.
        self.memory.remove(key);

        match removed {
            Ok(()) => true,
            Err(err) => {
                error!("Durable cache delete failed for {}: {}", key, err);
                false
            }
        }
    }

    /// Removes `key` from the memory tier only.
    ///
    /// For keys that are only ever written with `Tier::Memory`; skips the
    /// store round trip of `delete`.
    pub fn forget(&self, key: &str) -> bool {
        self.memory.remove(key)
    }

    // == Clear ==
    /// Flushes both tiers.
    pub async fn clear(&self) -> bool {
        self.memory.clear();

        let _guard = self.durable_lock.lock().await;
        let cleared = self.durable.clear().await;
        self.memory.clear();

        match cleared {
            Ok(()) => true,
            Err(err) => {
                error!("Durable cache clear failed: {}", err);
                false
            }
        }
    }

    // == Cleanup ==
    /// Removes expired entries from both tiers.
    ///
    /// The memory sweep is kept even when the durable sweep fails.
    pub async fn cleanup(&self) -> CleanupReport {
        let now = self.clock.now();
        let memory_removed = self.memory.sweep(now);

        let durable_removed = {
            let _guard = self.durable_lock.lock().await;
            match self.durable.purge_expired(now).await {
                Ok(removed) => Some(removed),
                Err(err) => {
                    error!("Durable cache cleanup failed: {}", err);
                    None
                }
            }
        };

        debug!(
            "Cache cleanup: removed {} memory and {:?} durable entries",
            memory_removed, durable_removed
        );

        CleanupReport {
            memory_removed,
            durable_removed,
        }
    }

    // == Stats ==
    /// Entry counts for both tiers; the durable half is omitted on error.
    pub async fn get_stats(&self) -> CacheStats {
        let now = self.clock.now();
        let memory = self.counters.snapshot(self.memory.counts(now));

        let durable = {
            let _guard = self.durable_lock.lock().await;
            match self.durable.counts(now).await {
                Ok(counts) => Some(counts),
                Err(err) => {
                    error!("Failed to read durable cache stats: {}", err);
                    None
                }
            }
        };

        CacheStats { memory, durable }
    }

    // == Read Through ==
    /// Returns the cached value for `key`, or computes, stores and returns it.
    ///
    /// Errors from `compute` are passed through and nothing is cached.
    pub async fn get_or_insert_with<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        tier: Tier,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get_as::<T>(key).await {
            return Ok(cached);
        }

        let value = compute().await?;
        self.set_as(key, &value, ttl, tier).await;
        Ok(value)
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("memory_entries", &self.memory.len())
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

// == Codec ==
fn encode(entry: &CacheEntry) -> Result<StoredRow, StoreError> {
    Ok(StoredRow {
        value: serde_json::to_string(&entry.value)?,
        expires_at: entry.expires_at,
    })
}

fn decode(key: &str, raw: &str) -> Result<Value, CacheError> {
    serde_json::from_str(raw).map_err(|source| CacheError::Decode {
        key: key.to_string(),
        source,
    })
}
