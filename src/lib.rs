//! Shopvault - cache and lock core of a community shop backend
//!
//! Provides a two-tier TTL cache (memory plus SQLite), per-key async lock
//! registries with a response-once namespace, and the balance, product and
//! transaction services built on them.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod lock;
pub mod models;
pub mod services;
pub mod tasks;

pub use api::{create_router, AppState};
pub use cache::{CacheManager, Tier};
pub use config::Config;
pub use db::Database;
pub use lock::{LockRegistry, RequestOrigin, ResponseOutcome};
pub use tasks::{run_maintenance, spawn_cleanup_task};
