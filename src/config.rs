//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Process configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the SQLite database file
    pub database_path: String,
    /// Default TTL in seconds for cache entries without explicit TTL
    pub default_ttl: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Background maintenance interval in seconds
    pub cleanup_interval: u64,
    /// Maximum wait for a resource lock, in seconds
    pub lock_timeout: u64,
    /// Maximum wait for a response lock, in seconds
    pub response_lock_timeout: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `DATABASE_PATH` - SQLite file (default: shop.db)
    /// - `DEFAULT_TTL` - Default cache TTL in seconds (default: 3600)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Maintenance frequency in seconds (default: 300)
    /// - `LOCK_TIMEOUT` - Resource lock wait in seconds (default: 10)
    /// - `RESPONSE_LOCK_TIMEOUT` - Response lock wait in seconds (default: 5)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_path: env::var("DATABASE_PATH").unwrap_or(defaults.database_path),
            default_ttl: parse_env("DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            server_port: parse_env("SERVER_PORT").unwrap_or(defaults.server_port),
            cleanup_interval: parse_env("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
            lock_timeout: parse_env("LOCK_TIMEOUT").unwrap_or(defaults.lock_timeout),
            response_lock_timeout: parse_env("RESPONSE_LOCK_TIMEOUT")
                .unwrap_or(defaults.response_lock_timeout),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout)
    }

    pub fn response_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.response_lock_timeout)
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "shop.db".to_string(),
            default_ttl: 3600,
            server_port: 3000,
            cleanup_interval: 300,
            lock_timeout: 10,
            response_lock_timeout: 5,
        }
    }
}
