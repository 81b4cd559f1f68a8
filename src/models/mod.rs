//! Request and Response models for the shop API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{
    AddStockRequest, AmountRequest, CacheSetRequest, CreateProductRequest, HistoryQuery,
    PurchaseRequest, RegisterRequest, WorldInfoRequest,
};
pub use responses::{
    BalanceResponse, CacheSetResponse, CacheValueResponse, ErrorResponse, HealthResponse,
    MessageResponse, StatsResponse, StockAddedResponse,
};
