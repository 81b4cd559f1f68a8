//! Error types for the shop backend
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Store Error ==
/// Failure talking to the SQLite store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Query or connection failure
    #[error("Database error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),

    /// Value could not be encoded for storage
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Sqlite(tokio_rusqlite::Error::Rusqlite(err))
    }
}

// == Cache Error ==
/// Internal cache failure. Logged by the cache and never returned to callers.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Durable tier unreachable or query failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Durable value is not valid JSON
    #[error("Failed to decode cached value for {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

// == Shop Error ==
/// Business-rule and infrastructure failures raised by the domain services.
#[derive(Error, Debug)]
pub enum ShopError {
    /// A lock could not be acquired in time
    #[error("System is busy, please try again later")]
    Busy(String),

    /// Discord user has no linked GrowID
    #[error("You need to register your GrowID first")]
    NotRegistered(String),

    /// GrowID unknown to the store
    #[error("User {0} not found")]
    UserNotFound(String),

    /// GrowID already taken with different casing
    #[error("GrowID already exists with different case: {0}")]
    GrowIdConflict(String),

    #[error("Product {0} not found")]
    ProductNotFound(String),

    #[error("Product with code '{0}' already exists")]
    ProductExists(String),

    #[error("Stock item {0} not found")]
    StockNotFound(i64),

    /// Stock content already present
    #[error("Stock item already exists")]
    DuplicateStock,

    #[error("Insufficient balance: need {needed} WL, have {available} WL")]
    InsufficientBalance { needed: i64, available: i64 },

    #[error("Insufficient stock: requested {requested}, only {available} available")]
    InsufficientStock { requested: usize, available: usize },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<tokio_rusqlite::Error> for ShopError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        ShopError::Store(StoreError::Sqlite(err))
    }
}

// == Api Error ==
/// Unified error type for the HTTP surface.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Key or resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Same request id already answered
    #[error("Duplicate request: {0}")]
    Duplicate(String),

    /// Response lock for the request id not acquired in time
    #[error("Request {0} is still being processed")]
    InFlight(String),

    #[error(transparent)]
    Shop(#[from] ShopError),
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Duplicate(_) => StatusCode::CONFLICT,
            ApiError::InFlight(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Shop(err) => match err {
                ShopError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
                ShopError::NotRegistered(_)
                | ShopError::UserNotFound(_)
                | ShopError::ProductNotFound(_)
                | ShopError::StockNotFound(_) => StatusCode::NOT_FOUND,
                ShopError::GrowIdConflict(_)
                | ShopError::ProductExists(_)
                | ShopError::DuplicateStock => StatusCode::CONFLICT,
                ShopError::InsufficientBalance { .. }
                | ShopError::InsufficientStock { .. }
                | ShopError::InvalidAmount(_)
                | ShopError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ShopError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Aliases ==
/// Convenience Result type for the domain services.
pub type ShopResult<T> = std::result::Result<T, ShopError>;

/// Convenience Result type for HTTP handlers.
pub type Result<T> = std::result::Result<T, ApiError>;
