//! Database Module
//!
//! Async SQLite access shared by the durable cache tier and the shop services.

mod schema;

use std::path::Path;

use tokio_rusqlite::Connection;
use tracing::info;

use crate::error::StoreError;

pub use schema::SCHEMA;

/// Handle to the shop database.
///
/// Cloning is cheap; every clone talks to the same connection, whose worker
/// thread runs calls one at a time.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens (or creates) the database at `path`. `":memory:"` opens a
    /// private in-memory database.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = if path == Path::new(":memory:") {
            Connection::open_in_memory().await?
        } else {
            Connection::open(path).await?
        };

        conn.call(|conn| conn.execute_batch(schema::PRAGMAS).map_err(Into::into))
            .await?;

        Ok(Self { conn })
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:").await
    }

    /// Creates all tables if they do not exist yet.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| conn.execute_batch(SCHEMA).map_err(Into::into))
            .await?;
        info!("SQLite schema initialized");
        Ok(())
    }

    /// Runs `function` on the connection's worker thread.
    pub async fn call<F, R>(&self, function: F) -> Result<R, tokio_rusqlite::Error>
    where
        F: FnOnce(&mut rusqlite::Connection) -> tokio_rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.conn.call(function).await
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        db.init_schema().await.unwrap();
        db.init_schema().await.unwrap();

        let tables: i64 = db
            .call(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'cache_table'",
                    [],
                    |row| row.get(0),
                )
                .map_err(Into::into)
            })
            .await
            .unwrap();
        assert_eq!(tables, 1);
    }
}
