//! Product Service
//!
//! Catalogue, stock and world info, cached per key and invalidated on write.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::{params, ErrorCode, OptionalExtension};
use tracing::info;

use crate::cache::{CacheManager, Tier};
use crate::db::Database;
use crate::error::{ShopError, ShopResult};
use crate::lock::LockRegistry;
use crate::services::models::{Product, StockItem, StockStatus, WorldInfo};

const PRODUCT_TTL: Duration = Duration::from_secs(3600);
const CATALOGUE_TTL: Duration = Duration::from_secs(300);
const STOCK_TTL: Duration = Duration::from_secs(30);
const WORLD_TTL: Duration = Duration::from_secs(300);

/// Largest quantity a single stock lookup or purchase may ask for.
pub const MAX_QUANTITY: usize = 100;

const ALL_PRODUCTS_KEY: &str = "all_products";
const WORLD_INFO_KEY: &str = "world_info";

// Product codes are case-insensitive, so their cache keys are lowercased.
fn product_key(code: &str) -> String {
    format!("product_{}", code.to_lowercase())
}

fn stock_count_key(code: &str) -> String {
    format!("stock_count_{}", code.to_lowercase())
}

fn stock_quantity_key(code: &str, quantity: usize) -> String {
    format!("stock_{}_q{}", code.to_lowercase(), quantity)
}

/// Rejects quantities outside `1..=MAX_QUANTITY`.
pub fn validate_quantity(quantity: usize) -> ShopResult<()> {
    if quantity == 0 || quantity > MAX_QUANTITY {
        return Err(ShopError::InvalidAmount(format!(
            "quantity must be between 1 and {}",
            MAX_QUANTITY
        )));
    }
    Ok(())
}

fn product_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        code: row.get(0)?,
        name: row.get(1)?,
        price: row.get(2)?,
        description: row.get(3)?,
    })
}

// == Product Service ==
#[derive(Clone, Debug)]
pub struct ProductService {
    db: Database,
    cache: Arc<CacheManager>,
    locks: LockRegistry,
}

impl ProductService {
    pub fn new(db: Database, cache: Arc<CacheManager>) -> Self {
        Self::with_locks(db, cache, LockRegistry::new("product"))
    }

    pub fn with_locks(db: Database, cache: Arc<CacheManager>, locks: LockRegistry) -> Self {
        Self { db, cache, locks }
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    // == Products ==
    pub async fn create_product(
        &self,
        code: &str,
        name: &str,
        price: i64,
        description: Option<String>,
    ) -> ShopResult<Product> {
        if code.trim().is_empty() || name.trim().is_empty() {
            return Err(ShopError::InvalidInput(
                "product code and name are required".into(),
            ));
        }
        if price <= 0 {
            return Err(ShopError::InvalidAmount("price must be greater than 0".into()));
        }

        let lock_key = format!("product_create_{}", code.to_lowercase());
        let _guard = self
            .locks
            .acquire(&lock_key)
            .await
            .ok_or_else(|| ShopError::Busy(lock_key.clone()))?;

        let product = Product {
            code: code.trim().to_string(),
            name: name.trim().to_string(),
            price,
            description,
        };

        let row = product.clone();
        self.db
            .call(move |conn| {
                let exists = conn
                    .query_row(
                        "SELECT 1 FROM products WHERE code = ?1",
                        params![row.code],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                if exists {
                    return Ok(Err(ShopError::ProductExists(row.code)));
                }

                conn.execute(
                    "INSERT INTO products (code, name, price, description) VALUES (?1, ?2, ?3, ?4)",
                    params![row.code, row.name, row.price, row.description],
                )?;
                Ok(Ok(()))
            })
            .await??;

        self.cache
            .set_as(&product_key(&product.code), &product, PRODUCT_TTL, Tier::Memory)
            .await;
        self.cache.delete(ALL_PRODUCTS_KEY).await;

        info!("Product created: {}", product.code);
        Ok(product)
    }

    pub async fn get_product(&self, code: &str) -> ShopResult<Option<Product>> {
        let key = product_key(code);
        if let Some(product) = self.cache.get_as::<Product>(&key).await {
            return Ok(Some(product));
        }

        let lock_key = format!("product_get_{}", code.to_lowercase());
        let _guard = self
            .locks
            .acquire(&lock_key)
            .await
            .ok_or_else(|| ShopError::Busy(lock_key.clone()))?;

        let code = code.to_string();
        let product = self
            .db
            .call(move |conn| {
                conn.query_row(
                    "SELECT code, name, price, description FROM products WHERE code = ?1",
                    params![code],
                    product_from_row,
                )
                .optional()
                .map_err(Into::into)
            })
            .await?;

        if let Some(product) = &product {
            self.cache
                .set_as(&key, product, PRODUCT_TTL, Tier::Memory)
                .await;
        }
        Ok(product)
    }

    pub async fn get_all_products(&self) -> ShopResult<Vec<Product>> {
        if let Some(products) = self.cache.get_as::<Vec<Product>>(ALL_PRODUCTS_KEY).await {
            return Ok(products);
        }

        let _guard = self
            .locks
            .acquire("products_getall")
            .await
            .ok_or_else(|| ShopError::Busy("products_getall".into()))?;

        let products = self
            .db
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT code, name, price, description FROM products ORDER BY code",
                )?;
                let rows = stmt.query_map([], product_from_row)?;
                rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
            })
            .await?;

        self.cache
            .set_as(ALL_PRODUCTS_KEY, &products, CATALOGUE_TTL, Tier::Memory)
            .await;
        Ok(products)
    }

    // == Stock ==
    /// Adds one unit of stock. Returns the new stock id.
    pub async fn add_stock_item(
        &self,
        code: &str,
        content: &str,
        added_by: &str,
    ) -> ShopResult<i64> {
        if content.trim().is_empty() {
            return Err(ShopError::InvalidInput("stock content cannot be empty".into()));
        }

        let lock_key = format!("stock_add_{}", code.to_lowercase());
        let _guard = self
            .locks
            .acquire(&lock_key)
            .await
            .ok_or_else(|| ShopError::Busy(lock_key.clone()))?;

        let (product_code, content, added_by) =
            (code.to_string(), content.to_string(), added_by.to_string());
        let id = self
            .db
            .call(move |conn| {
                let canonical: Option<String> = conn
                    .query_row(
                        "SELECT code FROM products WHERE code = ?1",
                        params![product_code],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(canonical) = canonical else {
                    return Ok(Err(ShopError::ProductNotFound(product_code)));
                };

                let inserted = conn.execute(
                    "INSERT INTO stock (product_code, content, added_by, status)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![canonical, content, added_by, StockStatus::Available.as_str()],
                );
                match inserted {
                    Ok(_) => Ok(Ok(conn.last_insert_rowid())),
                    Err(rusqlite::Error::SqliteFailure(err, _))
                        if err.code == ErrorCode::ConstraintViolation =>
                    {
                        Ok(Err(ShopError::DuplicateStock))
                    }
                    Err(err) => Err(err.into()),
                }
            })
            .await??;

        self.invalidate_stock(code);
        info!("Stock added for {}", code);
        Ok(id)
    }

    /// Oldest available units of `code`, at most `quantity` of them.
    pub async fn get_available_stock(
        &self,
        code: &str,
        quantity: usize,
    ) -> ShopResult<Vec<StockItem>> {
        validate_quantity(quantity)?;

        let key = stock_quantity_key(code, quantity);
        if let Some(items) = self.cache.get_as::<Vec<StockItem>>(&key).await {
            return Ok(items);
        }

        let lock_key = format!("stock_get_{}", code.to_lowercase());
        let _guard = self
            .locks
            .acquire(&lock_key)
            .await
            .ok_or_else(|| ShopError::Busy(lock_key.clone()))?;

        let items = self.load_available_stock(code, quantity).await?;
        self.cache.set_as(&key, &items, STOCK_TTL, Tier::Memory).await;
        Ok(items)
    }

    /// Uncached read of available stock, for callers that hold the stock lock.
    pub(crate) async fn load_available_stock(
        &self,
        code: &str,
        quantity: usize,
    ) -> ShopResult<Vec<StockItem>> {
        let code = code.to_string();
        let limit = i64::try_from(quantity).unwrap_or(i64::MAX);
        let items = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, content, added_at FROM stock
                     WHERE product_code = ?1 AND status = ?2
                     ORDER BY added_at ASC, id ASC LIMIT ?3",
                )?;
                let rows = stmt.query_map(
                    params![code, StockStatus::Available.as_str(), limit],
                    |row| {
                        Ok(StockItem {
                            id: row.get(0)?,
                            content: row.get(1)?,
                            added_at: row.get(2)?,
                        })
                    },
                )?;
                rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
            })
            .await?;
        Ok(items)
    }

    pub async fn get_stock_count(&self, code: &str) -> ShopResult<i64> {
        let key = stock_count_key(code);
        if let Some(count) = self.cache.get_as::<i64>(&key).await {
            return Ok(count);
        }

        let _guard = self
            .locks
            .acquire(&key)
            .await
            .ok_or_else(|| ShopError::Busy(key.clone()))?;

        let code = code.to_string();
        let count: i64 = self
            .db
            .call(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM stock WHERE product_code = ?1 AND status = ?2",
                    params![code, StockStatus::Available.as_str()],
                    |row| row.get(0),
                )
                .map_err(Into::into)
            })
            .await?;

        self.cache.set_as(&key, &count, STOCK_TTL, Tier::Memory).await;
        Ok(count)
    }

    pub async fn update_stock_status(
        &self,
        stock_id: i64,
        status: StockStatus,
        buyer_id: Option<&str>,
    ) -> ShopResult<()> {
        let lock_key = format!("stock_update_{}", stock_id);
        let _guard = self
            .locks
            .acquire(&lock_key)
            .await
            .ok_or_else(|| ShopError::Busy(lock_key.clone()))?;

        let buyer = buyer_id.map(str::to_string);
        let product_code = self
            .db
            .call(move |conn| {
                let code: Option<String> = conn
                    .query_row(
                        "SELECT product_code FROM stock WHERE id = ?1",
                        params![stock_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(code) = code else {
                    return Ok(Err(ShopError::StockNotFound(stock_id)));
                };

                conn.execute(
                    "UPDATE stock SET status = ?1, buyer_id = COALESCE(?2, buyer_id),
                     updated_at = CURRENT_TIMESTAMP WHERE id = ?3",
                    params![status.as_str(), buyer, stock_id],
                )?;
                Ok(Ok(code))
            })
            .await??;

        self.invalidate_stock(&product_code);
        info!("Stock {} status updated to {}", stock_id, status.as_str());
        Ok(())
    }

    /// Marks `ids` sold to `buyer_id` in one database transaction.
    ///
    /// Fails without changing anything if any unit is no longer available.
    pub(crate) async fn mark_sold(&self, code: &str, ids: Vec<i64>, buyer_id: &str) -> ShopResult<()> {
        let buyer = buyer_id.to_string();
        let requested = ids.len();
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut sold = 0;
                for id in &ids {
                    sold += tx.execute(
                        "UPDATE stock SET status = ?1, buyer_id = ?2, updated_at = CURRENT_TIMESTAMP
                         WHERE id = ?3 AND status = ?4",
                        params![
                            StockStatus::Sold.as_str(),
                            buyer,
                            id,
                            StockStatus::Available.as_str()
                        ],
                    )?;
                }
                if sold != requested {
                    // Dropping the transaction rolls it back.
                    return Ok(Err(ShopError::InsufficientStock {
                        requested,
                        available: sold,
                    }));
                }
                tx.commit()?;
                Ok(Ok(()))
            })
            .await??;

        self.invalidate_stock(code);
        Ok(())
    }

    /// Drops every cached stock view of `code`.
    ///
    /// Stock views are only ever cached in memory, so the durable tier is
    /// left alone.
    pub fn invalidate_stock(&self, code: &str) {
        self.cache.forget(&stock_count_key(code));
        for quantity in 1..=MAX_QUANTITY {
            self.cache.forget(&stock_quantity_key(code, quantity));
        }
    }

    // == World Info ==
    pub async fn get_world_info(&self) -> ShopResult<Option<WorldInfo>> {
        if let Some(info) = self.cache.get_as::<WorldInfo>(WORLD_INFO_KEY).await {
            return Ok(Some(info));
        }

        let _guard = self
            .locks
            .acquire("world_info_get")
            .await
            .ok_or_else(|| ShopError::Busy("world_info_get".into()))?;

        let info = self
            .db
            .call(|conn| {
                conn.query_row(
                    "SELECT world, owner, bot, updated_at FROM world_info WHERE id = 1",
                    [],
                    |row| {
                        Ok(WorldInfo {
                            world: row.get(0)?,
                            owner: row.get(1)?,
                            bot: row.get(2)?,
                            updated_at: row.get(3)?,
                        })
                    },
                )
                .optional()
                .map_err(Into::into)
            })
            .await?;

        if let Some(info) = &info {
            self.cache
                .set_as(WORLD_INFO_KEY, info, WORLD_TTL, Tier::Memory)
                .await;
        }
        Ok(info)
    }

    pub async fn update_world_info(&self, world: &str, owner: &str, bot: &str) -> ShopResult<()> {
        let _guard = self
            .locks
            .acquire("world_info_update")
            .await
            .ok_or_else(|| ShopError::Busy("world_info_update".into()))?;

        let (world, owner, bot) = (world.to_string(), owner.to_string(), bot.to_string());
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO world_info (id, world, owner, bot) VALUES (1, ?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET world = excluded.world, owner = excluded.owner,
                     bot = excluded.bot, updated_at = CURRENT_TIMESTAMP",
                    params![world, owner, bot],
                )
                .map_err(Into::into)
            })
            .await?;

        self.cache.delete(WORLD_INFO_KEY).await;
        info!("World info updated");
        Ok(())
    }
}
