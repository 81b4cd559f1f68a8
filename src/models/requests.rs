//! Request DTOs for the shop API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

use crate::services::Balance;

/// Longest cache key accepted over HTTP.
pub const MAX_KEY_LEN: usize = 256;

/// Request body for PUT /cache
///
/// # Fields
/// - `key`: Cache key
/// - `value`: Any JSON value
/// - `ttl`: Optional TTL in seconds (uses default if not specified)
/// - `durable`: Also write the durable tier
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSetRequest {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub durable: bool,
}

impl CacheSetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LEN {
            return Some(format!(
                "Key exceeds maximum length of {} characters",
                MAX_KEY_LEN
            ));
        }
        if self.ttl == Some(0) {
            return Some("TTL must be at least 1 second".to_string());
        }
        None
    }
}

/// Request body for POST /users
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub discord_id: String,
    pub growid: String,
}

/// Request body for POST /products
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductRequest {
    pub code: String,
    pub name: String,
    pub price: i64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Request body for POST /products/:code/stock
#[derive(Debug, Clone, Deserialize)]
pub struct AddStockRequest {
    pub content: String,
    pub added_by: String,
}

/// Request body for POST /deposit and POST /withdraw
#[derive(Debug, Clone, Deserialize)]
pub struct AmountRequest {
    pub discord_id: String,
    #[serde(default)]
    pub wl: i64,
    #[serde(default)]
    pub dl: i64,
    #[serde(default)]
    pub bgl: i64,
}

impl AmountRequest {
    pub fn amount(&self) -> Balance {
        Balance::new(self.wl, self.dl, self.bgl)
    }
}

fn default_quantity() -> usize {
    1
}

/// Request body for POST /purchase
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseRequest {
    pub discord_id: String,
    pub product_code: String,
    #[serde(default = "default_quantity")]
    pub quantity: usize,
}

/// Request body for PUT /world
#[derive(Debug, Clone, Deserialize)]
pub struct WorldInfoRequest {
    pub world: String,
    pub owner: String,
    pub bot: String,
}

/// Query string for GET /users/:growid/transactions
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}
