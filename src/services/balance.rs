//! Balance Service
//!
//! GrowID registration and lock-protected balance updates.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

use crate::cache::{CacheManager, Tier};
use crate::db::Database;
use crate::error::{ShopError, ShopResult};
use crate::lock::LockRegistry;
use crate::services::models::{Balance, TransactionKind, TransactionRecord};

const ID_TTL: Duration = Duration::from_secs(3600);
const BALANCE_TTL: Duration = Duration::from_secs(30);
const HISTORY_TTL: Duration = Duration::from_secs(60);

/// Rows kept in the cached transaction history.
const HISTORY_DEPTH: usize = 50;

fn growid_key(discord_id: &str) -> String {
    format!("growid_{}", discord_id)
}

fn discord_id_key(growid: &str) -> String {
    format!("discord_id_{}", growid)
}

fn balance_key(growid: &str) -> String {
    format!("balance_{}", growid)
}

fn history_key(growid: &str) -> String {
    format!("trx_history_{}", growid)
}

// == Balance Change ==
/// One ledger movement applied by `update_balance_with`.
#[derive(Debug, Clone)]
pub struct BalanceChange {
    /// Signed amount in World Locks
    pub delta_wl: i64,
    pub details: String,
    pub kind: TransactionKind,
    pub items_count: i64,
    pub total_price: i64,
}

impl BalanceChange {
    pub fn new(delta_wl: i64, details: impl Into<String>, kind: TransactionKind) -> Self {
        Self {
            delta_wl,
            details: details.into(),
            kind,
            items_count: 0,
            total_price: 0,
        }
    }
}

// == Balance Service ==
#[derive(Clone, Debug)]
pub struct BalanceService {
    db: Database,
    cache: Arc<CacheManager>,
    locks: LockRegistry,
}

impl BalanceService {
    pub fn new(db: Database, cache: Arc<CacheManager>) -> Self {
        Self::with_locks(db, cache, LockRegistry::new("balance"))
    }

    pub fn with_locks(db: Database, cache: Arc<CacheManager>, locks: LockRegistry) -> Self {
        Self { db, cache, locks }
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    // == Identity ==
    /// GrowID linked to a Discord user.
    pub async fn get_growid(&self, discord_id: &str) -> ShopResult<Option<String>> {
        let key = growid_key(discord_id);
        if let Some(growid) = self.cache.get_as::<String>(&key).await {
            return Ok(Some(growid));
        }

        let _guard = self
            .locks
            .acquire(&key)
            .await
            .ok_or_else(|| ShopError::Busy(key.clone()))?;

        let id = discord_id.to_string();
        let growid: Option<String> = self
            .db
            .call(move |conn| {
                conn.query_row(
                    "SELECT growid FROM user_growid WHERE discord_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(Into::into)
            })
            .await?;

        if let Some(growid) = &growid {
            self.cache
                .set_as(&key, growid, ID_TTL, Tier::Memory)
                .await;
            debug!("Found GrowID for Discord ID {}: {}", discord_id, growid);
        }
        Ok(growid)
    }

    /// Discord user linked to a GrowID.
    pub async fn get_user_by_growid(&self, growid: &str) -> ShopResult<Option<String>> {
        let key = discord_id_key(growid);
        if let Some(discord_id) = self.cache.get_as::<String>(&key).await {
            return Ok(Some(discord_id));
        }

        let growid = growid.to_string();
        let discord_id: Option<String> = self
            .db
            .call(move |conn| {
                conn.query_row(
                    "SELECT discord_id FROM user_growid WHERE growid = ?1",
                    params![growid],
                    |row| row.get(0),
                )
                .optional()
                .map_err(Into::into)
            })
            .await?;

        if let Some(discord_id) = &discord_id {
            self.cache
                .set_as(&key, discord_id, ID_TTL, Tier::Memory)
                .await;
        }
        Ok(discord_id)
    }

    /// Links `discord_id` to `growid`, creating the user if needed.
    ///
    /// A GrowID that exists with different letter case is rejected.
    pub async fn register_user(&self, discord_id: &str, growid: &str) -> ShopResult<()> {
        let growid = growid.trim();
        if growid.is_empty() {
            return Err(ShopError::InvalidInput("GrowID cannot be empty".into()));
        }

        let lock_key = format!("register_{}", discord_id);
        let _guard = self
            .locks
            .acquire(&lock_key)
            .await
            .ok_or_else(|| ShopError::Busy(lock_key.clone()))?;

        let (id, name) = (discord_id.to_string(), growid.to_string());
        let previous = self
            .db
            .call(move |conn| {
                let tx = conn.transaction()?;

                let existing: Option<String> = tx
                    .query_row(
                        "SELECT growid FROM users WHERE growid = ?1 COLLATE NOCASE",
                        params![name],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(existing) = existing.filter(|existing| *existing != name) {
                    return Ok(Err(ShopError::GrowIdConflict(existing)));
                }

                let previous: Option<String> = tx
                    .query_row(
                        "SELECT growid FROM user_growid WHERE discord_id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?;

                tx.execute("INSERT OR IGNORE INTO users (growid) VALUES (?1)", params![name])?;
                tx.execute(
                    "INSERT OR REPLACE INTO user_growid (discord_id, growid) VALUES (?1, ?2)",
                    params![id, name],
                )?;
                tx.commit()?;
                Ok(Ok(previous))
            })
            .await??;

        if let Some(previous) = previous.filter(|previous| previous != growid) {
            self.cache.delete(&discord_id_key(&previous)).await;
        }
        self.cache
            .set_as(&growid_key(discord_id), &growid, ID_TTL, Tier::Memory)
            .await;
        self.cache
            .set_as(&discord_id_key(growid), &discord_id, ID_TTL, Tier::Memory)
            .await;
        self.cache.delete(&balance_key(growid)).await;

        info!("Registered Discord user {} with GrowID {}", discord_id, growid);
        Ok(())
    }

    // == Balance ==
    /// Current balance, or `None` for an unknown GrowID.
    pub async fn get_balance(&self, growid: &str) -> ShopResult<Option<Balance>> {
        let key = balance_key(growid);
        if let Some(balance) = self.cache.get_as::<Balance>(&key).await {
            return Ok(Some(balance));
        }

        // Loaded under the update lock so a slow read cannot cache a balance
        // older than the one an update just wrote.
        let lock_key = format!("balance_update_{}", growid);
        let _guard = self
            .locks
            .acquire(&lock_key)
            .await
            .ok_or_else(|| ShopError::Busy(lock_key.clone()))?;

        let balance = load_balance(&self.db, growid).await?;
        if let Some(balance) = &balance {
            self.cache
                .set_as(&key, balance, BALANCE_TTL, Tier::Memory)
                .await;
        }
        Ok(balance)
    }

    /// Adds `delta_wl` (negative to debit) and records the movement.
    ///
    /// # Arguments
    /// * `growid` - Account to update
    /// * `delta_wl` - Signed amount in World Locks
    /// * `details` - Free text stored with the transaction row
    /// * `kind` - Transaction type
    ///
    /// # Returns
    /// The new, normalized balance.
    pub async fn update_balance(
        &self,
        growid: &str,
        delta_wl: i64,
        details: &str,
        kind: TransactionKind,
    ) -> ShopResult<Balance> {
        self.update_balance_with(growid, BalanceChange::new(delta_wl, details, kind))
            .await
    }

    /// `update_balance` with item count and price recorded on the row.
    pub async fn update_balance_with(
        &self,
        growid: &str,
        change: BalanceChange,
    ) -> ShopResult<Balance> {
        let lock_key = format!("balance_update_{}", growid);
        let _guard = self
            .locks
            .acquire(&lock_key)
            .await
            .ok_or_else(|| ShopError::Busy(lock_key.clone()))?;

        let name = growid.to_string();
        let (old, new) = self
            .db
            .call(move |conn| {
                let tx = conn.transaction()?;

                let current = tx
                    .query_row(
                        "SELECT balance_wl, balance_dl, balance_bgl FROM users WHERE growid = ?1",
                        params![name],
                        |row| Ok(Balance::new(row.get(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .optional()?;
                let Some(old) = current else {
                    return Ok(Err(ShopError::UserNotFound(name)));
                };

                let Some((available, total)) = old.total_wl().and_then(|available| {
                    Some((available, available.checked_add(change.delta_wl)?))
                }) else {
                    return Ok(Err(ShopError::InvalidAmount(format!(
                        "balance of {} would be out of range",
                        name
                    ))));
                };
                if total < 0 {
                    return Ok(Err(ShopError::InsufficientBalance {
                        needed: change.delta_wl.saturating_neg(),
                        available,
                    }));
                }
                let new = Balance::from_wl(total);

                tx.execute(
                    "UPDATE users SET balance_wl = ?1, balance_dl = ?2, balance_bgl = ?3,
                     updated_at = CURRENT_TIMESTAMP WHERE growid = ?4",
                    params![new.wl, new.dl, new.bgl, name],
                )?;
                tx.execute(
                    "INSERT INTO transactions
                     (growid, type, details, old_balance, new_balance, items_count, total_price)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        name,
                        change.kind.as_str(),
                        change.details,
                        old.to_string(),
                        new.to_string(),
                        change.items_count,
                        change.total_price
                    ],
                )?;
                tx.commit()?;
                Ok(Ok((old, new)))
            })
            .await??;

        self.cache
            .set_as(&balance_key(growid), &new, BALANCE_TTL, Tier::Memory)
            .await;
        self.cache.delete(&history_key(growid)).await;

        info!("Updated balance for {}: {} -> {}", growid, old, new);
        Ok(new)
    }

    // == History ==
    /// Most recent transactions first.
    pub async fn get_transaction_history(
        &self,
        growid: &str,
        limit: usize,
    ) -> ShopResult<Vec<TransactionRecord>> {
        if limit > HISTORY_DEPTH {
            return load_history(&self.db, growid, limit).await;
        }

        let key = history_key(growid);
        let history = self
            .cache
            .get_or_insert_with(&key, HISTORY_TTL, Tier::Memory, || {
                load_history(&self.db, growid, HISTORY_DEPTH)
            })
            .await?;

        Ok(history.into_iter().take(limit).collect())
    }
}

async fn load_balance(db: &Database, growid: &str) -> ShopResult<Option<Balance>> {
    let growid = growid.to_string();
    let balance = db
        .call(move |conn| {
            conn.query_row(
                "SELECT balance_wl, balance_dl, balance_bgl FROM users WHERE growid = ?1",
                params![growid],
                |row| Ok(Balance::new(row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(Into::into)
        })
        .await?;
    Ok(balance)
}

async fn load_history(
    db: &Database,
    growid: &str,
    limit: usize,
) -> ShopResult<Vec<TransactionRecord>> {
    let growid = growid.to_string();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let records = db
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, growid, type, details, old_balance, new_balance,
                        items_count, total_price, created_at
                 FROM transactions WHERE growid = ?1
                 ORDER BY created_at DESC, id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![growid, limit], |row| {
                Ok(TransactionRecord {
                    id: row.get(0)?,
                    growid: row.get(1)?,
                    kind: row.get(2)?,
                    details: row.get(3)?,
                    old_balance: row.get(4)?,
                    new_balance: row.get(5)?,
                    items_count: row.get(6)?,
                    total_price: row.get(7)?,
                    created_at: row.get(8)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })
        .await?;
    Ok(records)
}
