//! Cache Statistics Module
//!
//! Per-tier entry counts plus hit/miss counters for the memory path.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Tier Stats ==
/// Entry counts for one storage tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierStats {
    /// Number of stored entries, expired or not
    pub total: u64,
    /// Entries that are still valid
    pub valid: u64,
    /// Entries past their expiry that have not been purged yet
    pub expired: u64,
}

impl TierStats {
    pub fn new(total: u64, valid: u64) -> Self {
        Self {
            total,
            valid,
            expired: total.saturating_sub(valid),
        }
    }
}

// == Memory Stats ==
/// Memory tier counts and read counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryStats {
    #[serde(flatten)]
    pub entries: TierStats,
    /// Reads answered from either tier
    pub hits: u64,
    /// Reads that fell through to the default
    pub misses: u64,
    /// Durable hits copied into memory
    pub promotions: u64,
    /// hits / (hits + misses)
    pub hit_rate: f64,
}

// == Cache Stats ==
/// Snapshot returned by `CacheManager::get_stats`.
///
/// `durable` is `None` when the durable tier could not be queried.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub memory: MemoryStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub durable: Option<TierStats>,
}

// == Read Counters ==
/// Lock-free read counters shared by concurrent callers.
#[derive(Debug, Default)]
pub struct ReadCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    promotions: AtomicU64,
}

impl ReadCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A durable hit counts as both a hit and a promotion.
    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
        self.record_hit();
    }

    /// Builds the memory segment of the statistics from these counters.
    pub fn snapshot(&self, entries: TierStats) -> MemoryStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        MemoryStats {
            entries,
            hits,
            misses,
            promotions: self.promotions.load(Ordering::Relaxed),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}
