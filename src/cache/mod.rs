//! Cache Module
//!
//! Two-tier caching with TTL expiration: a fast memory tier backed by an
//! optional durable SQLite table.

mod durable;
mod entry;
mod manager;
mod memory;
mod stats;


// Re-export public types
pub use durable::{DurableTier, SqliteTier, StoredRow};
pub use entry::{expiry_after, CacheEntry};
pub use manager::{CacheManager, CleanupReport, Tier, DEFAULT_TTL};
pub use memory::{Lookup, MemoryTier};
pub use stats::{CacheStats, MemoryStats, ReadCounters, TierStats};
