//! Durable Tier Module
//!
//! Persistent backing for cache entries that must survive a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::cache::TierStats;
use crate::db::Database;
use crate::error::StoreError;

// == Stored Row ==
/// A raw row as kept by the durable tier.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    /// JSON text of the value
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

// == Durable Tier Trait ==
/// Key/value table keyed by cache key.
///
/// Implementations are not required to be safe under concurrent writers;
/// `CacheManager` serializes every call.
#[async_trait]
pub trait DurableTier: Send + Sync {
    /// Point lookup.
    async fn fetch(&self, key: &str) -> Result<Option<StoredRow>, StoreError>;

    /// Insert or replace the row for `key`.
    async fn upsert(&self, key: &str, row: StoredRow) -> Result<(), StoreError>;

    /// Point delete. Deleting a missing key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Deletes every row.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Deletes rows with `expires_at <= now`. Returns the number removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Counts rows at `now`.
    async fn counts(&self, now: DateTime<Utc>) -> Result<TierStats, StoreError>;
}

// == SQLite Tier ==
/// Durable tier backed by the `cache_table` SQLite table.
#[derive(Debug, Clone)]
pub struct SqliteTier {
    db: Database,
}

impl SqliteTier {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl DurableTier for SqliteTier {
    async fn fetch(&self, key: &str) -> Result<Option<StoredRow>, StoreError> {
        let key = key.to_string();
        let row = self
            .db
            .call(move |conn| {
                conn.query_row(
                    "SELECT value, expires_at FROM cache_table WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()
                .map_err(Into::into)
            })
            .await?;

        Ok(row.map(|(value, expires_at)| StoredRow {
            value,
            expires_at: from_millis(expires_at),
        }))
    }

    async fn upsert(&self, key: &str, row: StoredRow) -> Result<(), StoreError> {
        let key = key.to_string();
        let expires_at = to_millis(row.expires_at);
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO cache_table (key, value, expires_at) VALUES (?1, ?2, ?3)",
                    params![key, row.value, expires_at],
                )
                .map_err(Into::into)
            })
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.db
            .call(move |conn| {
                conn.execute("DELETE FROM cache_table WHERE key = ?1", params![key])
                    .map_err(Into::into)
            })
            .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.db
            .call(|conn| conn.execute("DELETE FROM cache_table", []).map_err(Into::into))
            .await?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let now = to_millis(now);
        let removed = self
            .db
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM cache_table WHERE expires_at <= ?1",
                    params![now],
                )
                .map_err(Into::into)
            })
            .await?;
        Ok(removed as u64)
    }

    async fn counts(&self, now: DateTime<Utc>) -> Result<TierStats, StoreError> {
        let now = to_millis(now);
        let (total, valid) = self
            .db
            .call(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*), COUNT(CASE WHEN expires_at > ?1 THEN 1 END) FROM cache_table",
                    params![now],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                )
                .map_err(Into::into)
            })
            .await?;
        Ok(TierStats::new(total as u64, valid as u64))
    }
}
