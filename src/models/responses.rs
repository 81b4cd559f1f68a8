//! Response DTOs for the shop API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheStats;
use crate::lock::LockStats;
use crate::services::{AccountBalance, Balance};

/// Response body for GET /cache/:key
#[derive(Debug, Clone, Serialize)]
pub struct CacheValueResponse {
    pub key: String,
    pub value: Value,
}

impl CacheValueResponse {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Response body for PUT /cache
#[derive(Debug, Clone, Serialize)]
pub struct CacheSetResponse {
    /// Success message
    pub message: String,
    /// The key that was set
    pub key: String,
    /// False when a durable write was requested and failed
    pub durable_written: bool,
}

impl CacheSetResponse {
    pub fn new(key: impl Into<String>, durable_written: bool) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
            durable_written,
        }
    }
}

/// Generic acknowledgement body (deletes, clears, registrations)
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
    pub success: bool,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>, success: bool) -> Self {
        Self {
            message: message.into(),
            success,
        }
    }
}

/// Response body for GET /cache/stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub cache: CacheStats,
    /// Lock statistics per service registry
    pub locks: BTreeMap<&'static str, LockStats>,
}

/// Response body for balance reads and balance-changing operations
#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub growid: String,
    pub balance: Balance,
    pub total_wl: i64,
    /// Human-readable form, e.g. "1 BGL + 2 DL"
    pub formatted: String,
}

impl BalanceResponse {
    pub fn new(growid: impl Into<String>, balance: Balance) -> Self {
        Self {
            growid: growid.into(),
            // Stored balances come from `Balance::from_wl` and always fit.
            total_wl: balance.total_wl().unwrap_or(i64::MAX),
            formatted: balance.to_string(),
            balance,
        }
    }
}

impl From<AccountBalance> for BalanceResponse {
    fn from(account: AccountBalance) -> Self {
        Self::new(account.growid, account.balance)
    }
}

/// Response body for POST /products/:code/stock
#[derive(Debug, Clone, Serialize)]
pub struct StockAddedResponse {
    pub id: i64,
    pub product_code: String,
    pub available: i64,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
