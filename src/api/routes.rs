//! API Routes
//!
//! Configures the Axum router with all shop endpoints.

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    add_stock_handler, balance_handler, cleanup_handler, clear_cache_handler,
    create_product_handler, delete_cache_handler, deposit_handler, get_cache_handler,
    get_product_handler, get_world_handler, health_handler, history_handler,
    list_products_handler, purchase_handler, put_world_handler, register_handler,
    set_cache_handler, stats_handler, withdraw_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check endpoint
/// - `GET /cache/stats` - Cache and lock statistics
/// - `PUT /cache`, `DELETE /cache` - Store a value, flush both tiers
/// - `GET /cache/:key`, `DELETE /cache/:key` - Read or delete one key
/// - `POST /cache/cleanup` - Sweep expired entries now
/// - `POST /users`, `GET /users/:growid/balance`, `GET /users/:growid/transactions`
/// - `GET|POST /products`, `GET /products/:code`, `POST /products/:code/stock`
/// - `GET|PUT /world`
/// - `POST /deposit`, `POST /withdraw`, `POST /purchase` - honour `x-request-id`
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/cache", put(set_cache_handler).delete(clear_cache_handler))
        .route("/cache/stats", get(stats_handler))
        .route("/cache/cleanup", post(cleanup_handler))
        .route(
            "/cache/:key",
            get(get_cache_handler).delete(delete_cache_handler),
        )
        .route("/users", post(register_handler))
        .route("/users/:growid/balance", get(balance_handler))
        .route("/users/:growid/transactions", get(history_handler))
        .route(
            "/products",
            get(list_products_handler).post(create_product_handler),
        )
        .route("/products/:code", get(get_product_handler))
        .route("/products/:code/stock", post(add_stock_handler))
        .route("/world", get(get_world_handler).put(put_world_handler))
        .route("/deposit", post(deposit_handler))
        .route("/withdraw", post(withdraw_handler))
        .route("/purchase", post(purchase_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
