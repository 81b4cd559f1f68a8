//! API Module
//!
//! HTTP handlers and routing for the cache maintenance and shop REST API.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `/cache/...` - Inspect and maintain the two-tier cache
//! - `/users/...`, `/products/...`, `/world` - Shop reads and admin writes
//! - `POST /deposit`, `POST /withdraw`, `POST /purchase` - Money movements

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
