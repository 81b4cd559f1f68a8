//! API Handlers
//!
//! HTTP request handlers for the cache maintenance and shop endpoints.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::cache::{CacheManager, CleanupReport, Tier};
use crate::config::Config;
use crate::db::Database;
use crate::error::{ApiError, Result, ShopError};
use crate::lock::{LockRegistry, RequestOrigin, ResponseOutcome, DEFAULT_RESPONSE_TIMEOUT};
use crate::models::{
    AddStockRequest, AmountRequest, BalanceResponse, CacheSetRequest, CacheSetResponse,
    CacheValueResponse, CreateProductRequest, HealthResponse, HistoryQuery, MessageResponse,
    PurchaseRequest, RegisterRequest, StatsResponse, StockAddedResponse, WorldInfoRequest,
};
use crate::services::{
    BalanceService, Product, ProductService, PurchaseReceipt, TransactionRecord,
    TransactionService, WorldInfo,
};

/// Header carrying a client-chosen id that makes a money request answer once.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Application state shared across all handlers.
///
/// Every field is a cheap handle; clones share the cache, the database and
/// each service's lock registry.
#[derive(Clone, Debug)]
pub struct AppState {
    pub cache: Arc<CacheManager>,
    pub balances: BalanceService,
    pub products: ProductService,
    pub transactions: TransactionService,
    /// Response-once namespace for `x-request-id`
    pub requests: LockRegistry,
    pub response_timeout: Duration,
}

impl AppState {
    /// Creates the services with default lock timeouts.
    pub fn new(db: Database, cache: Arc<CacheManager>) -> Self {
        Self::with_registries(db, cache, LockRegistry::new, DEFAULT_RESPONSE_TIMEOUT)
    }

    /// Creates the services with the lock timeouts from `config`.
    pub fn from_config(db: Database, cache: Arc<CacheManager>, config: &Config) -> Self {
        let (lock_timeout, response_timeout) =
            (config.lock_timeout(), config.response_lock_timeout());
        Self::with_registries(
            db,
            cache,
            |owner| LockRegistry::new(owner).with_timeouts(lock_timeout, response_timeout),
            response_timeout,
        )
    }

    fn with_registries(
        db: Database,
        cache: Arc<CacheManager>,
        registry: impl Fn(&'static str) -> LockRegistry,
        response_timeout: Duration,
    ) -> Self {
        let balances = BalanceService::with_locks(db.clone(), cache.clone(), registry("balance"));
        let products = ProductService::with_locks(db, cache.clone(), registry("product"));
        let transactions = TransactionService::with_locks(
            balances.clone(),
            products.clone(),
            registry("transaction"),
        );

        Self {
            cache,
            balances,
            products,
            transactions,
            requests: registry("requests"),
            response_timeout,
        }
    }

    /// Every lock registry owned by the application, for maintenance.
    pub fn registries(&self) -> Vec<LockRegistry> {
        vec![
            self.balances.locks().clone(),
            self.products.locks().clone(),
            self.transactions.locks().clone(),
            self.requests.clone(),
        ]
    }
}

/// Runs `run` at most once per `x-request-id`; without the header it just runs.
async fn respond_once<T, F, Fut>(state: &AppState, headers: &HeaderMap, run: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let Some(request_id) = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
    else {
        return run().await;
    };

    let origin = RequestOrigin::Other(request_id.to_string());
    match state
        .requests
        .respond_once(&origin, state.response_timeout, run)
        .await
    {
        ResponseOutcome::Sent(result) => result,
        ResponseOutcome::Suppressed => Err(ApiError::Duplicate(request_id.to_string())),
        ResponseOutcome::TimedOut => Err(ApiError::InFlight(request_id.to_string())),
    }
}

// == Health / Stats ==

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Handler for GET /cache/stats
///
/// Returns cache tier counts plus lock statistics for every registry.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let cache = state.cache.get_stats().await;
    let locks: BTreeMap<_, _> = state
        .registries()
        .iter()
        .map(|registry| (registry.owner(), registry.stats()))
        .collect();

    Json(StatsResponse { cache, locks })
}

// == Cache ==

/// Handler for GET /cache/:key
pub async fn get_cache_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<CacheValueResponse>> {
    let value = state
        .cache
        .get(&key)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Key '{}'", key)))?;

    Ok(Json(CacheValueResponse::new(key, value)))
}

/// Handler for PUT /cache
///
/// Stores a value with optional TTL; `durable` also writes the durable tier.
pub async fn set_cache_handler(
    State(state): State<AppState>,
    Json(req): Json<CacheSetRequest>,
) -> Result<Json<CacheSetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }

    let ttl = req
        .ttl
        .map(Duration::from_secs)
        .unwrap_or_else(|| state.cache.default_ttl());
    let tier = if req.durable { Tier::Durable } else { Tier::Memory };
    let written = state.cache.set(&req.key, req.value, ttl, tier).await;

    Ok(Json(CacheSetResponse::new(req.key, written)))
}

/// Handler for DELETE /cache/:key
pub async fn delete_cache_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<MessageResponse> {
    let success = state.cache.delete(&key).await;
    Json(MessageResponse::new(format!("Key '{}' deleted", key), success))
}

/// Handler for DELETE /cache
pub async fn clear_cache_handler(State(state): State<AppState>) -> Json<MessageResponse> {
    let success = state.cache.clear().await;
    Json(MessageResponse::new("Cache cleared", success))
}

/// Handler for POST /cache/cleanup
pub async fn cleanup_handler(State(state): State<AppState>) -> Json<CleanupReport> {
    Json(state.cache.cleanup().await)
}

// == Users ==

/// Handler for POST /users
pub async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    state
        .balances
        .register_user(&req.discord_id, &req.growid)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(
            format!("Registered {} as {}", req.discord_id, req.growid),
            true,
        )),
    ))
}

/// Handler for GET /users/:growid/balance
pub async fn balance_handler(
    State(state): State<AppState>,
    Path(growid): Path<String>,
) -> Result<Json<BalanceResponse>> {
    let balance = state
        .balances
        .get_balance(&growid)
        .await?
        .ok_or_else(|| ShopError::UserNotFound(growid.clone()))?;

    Ok(Json(BalanceResponse::new(growid, balance)))
}

/// Handler for GET /users/:growid/transactions
pub async fn history_handler(
    State(state): State<AppState>,
    Path(growid): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<TransactionRecord>>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let history = state
        .balances
        .get_transaction_history(&growid, limit)
        .await?;
    Ok(Json(history))
}

// == Products ==

/// Handler for GET /products
pub async fn list_products_handler(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.products.get_all_products().await?))
}

/// Handler for POST /products
pub async fn create_product_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>)> {
    let product = state
        .products
        .create_product(&req.code, &req.name, req.price, req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Handler for GET /products/:code
pub async fn get_product_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Product>> {
    let product = state
        .products
        .get_product(&code)
        .await?
        .ok_or(ShopError::ProductNotFound(code))?;
    Ok(Json(product))
}

/// Handler for POST /products/:code/stock
pub async fn add_stock_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(req): Json<AddStockRequest>,
) -> Result<(StatusCode, Json<StockAddedResponse>)> {
    let id = state
        .products
        .add_stock_item(&code, &req.content, &req.added_by)
        .await?;
    let available = state.products.get_stock_count(&code).await?;

    Ok((
        StatusCode::CREATED,
        Json(StockAddedResponse {
            id,
            product_code: code,
            available,
        }),
    ))
}

/// Handler for GET /world
pub async fn get_world_handler(State(state): State<AppState>) -> Result<Json<WorldInfo>> {
    let info = state
        .products
        .get_world_info()
        .await?
        .ok_or_else(|| ApiError::NotFound("World info".to_string()))?;
    Ok(Json(info))
}

/// Handler for PUT /world
pub async fn put_world_handler(
    State(state): State<AppState>,
    Json(req): Json<WorldInfoRequest>,
) -> Result<Json<MessageResponse>> {
    state
        .products
        .update_world_info(&req.world, &req.owner, &req.bot)
        .await?;
    Ok(Json(MessageResponse::new("World info updated", true)))
}

// == Money ==

/// Handler for POST /deposit
pub async fn deposit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AmountRequest>,
) -> Result<Json<BalanceResponse>> {
    respond_once(&state, &headers, || async {
        let account = state
            .transactions
            .process_deposit(&req.discord_id, req.amount())
            .await?;
        Ok(Json(BalanceResponse::from(account)))
    })
    .await
}

/// Handler for POST /withdraw
pub async fn withdraw_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AmountRequest>,
) -> Result<Json<BalanceResponse>> {
    respond_once(&state, &headers, || async {
        let account = state
            .transactions
            .process_withdrawal(&req.discord_id, req.amount())
            .await?;
        Ok(Json(BalanceResponse::from(account)))
    })
    .await
}

/// Handler for POST /purchase
pub async fn purchase_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PurchaseRequest>,
) -> Result<Json<PurchaseReceipt>> {
    respond_once(&state, &headers, || async {
        let receipt = state
            .transactions
            .process_purchase(&req.discord_id, &req.product_code, req.quantity)
            .await?;
        Ok(Json(receipt))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    async fn test_state() -> AppState {
        let db = Database::open_in_memory().await.unwrap();
        db.init_schema().await.unwrap();
        let cache = Arc::new(CacheManager::sqlite(db.clone()));
        AppState::new(db, cache)
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let state = test_state().await;

        let req = CacheSetRequest {
            key: "test_key".to_string(),
            value: json!({"wl": 100}),
            ttl: None,
            durable: true,
        };
        let response = set_cache_handler(State(state.clone()), Json(req)).await.unwrap();
        assert!(response.durable_written);

        let response = get_cache_handler(State(state), Path("test_key".to_string()))
            .await
            .unwrap();
        assert_eq!(response.value, json!({"wl": 100}));
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let state = test_state().await;

        let result = get_cache_handler(State(state), Path("nonexistent".to_string())).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_handler_is_idempotent() {
        let state = test_state().await;

        let response = delete_cache_handler(State(state), Path("nonexistent".to_string())).await;
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_set_invalid_request() {
        let state = test_state().await;

        let req = CacheSetRequest {
            key: "".to_string(),
            value: json!("value"),
            ttl: None,
            durable: false,
        };
        let result = set_cache_handler(State(state), Json(req)).await;
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_stats_handler_lists_registries() {
        let state = test_state().await;

        let response = stats_handler(State(state)).await;
        assert_eq!(response.cache.memory.hits, 0);
        assert_eq!(response.locks.len(), 4);
        assert!(response.cache.durable.is_some());
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }

    #[tokio::test]
    async fn test_respond_once_suppresses_repeated_request_id() {
        let state = test_state().await;
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-1"));

        let first = respond_once(&state, &headers, || async { Ok(1) }).await;
        let second = respond_once(&state, &headers, || async { Ok(2) }).await;

        assert_eq!(first.unwrap(), 1);
        assert!(matches!(second, Err(ApiError::Duplicate(id)) if id == "req-1"));
    }

    #[tokio::test]
    async fn test_respond_once_without_header_always_runs() {
        let state = test_state().await;
        let headers = HeaderMap::new();

        assert_eq!(respond_once(&state, &headers, || async { Ok(1) }).await.unwrap(), 1);
        assert_eq!(respond_once(&state, &headers, || async { Ok(2) }).await.unwrap(), 2);
    }
}
