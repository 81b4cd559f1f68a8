//! Services Module
//!
//! Domain facades over the shared cache and database. Each service owns its
//! own `LockRegistry`; clones share it.
//!
//! Lock order across services is transaction -> balance / product, never the
//! reverse.

mod balance;
mod models;
mod product;
mod transaction;

pub use balance::{BalanceChange, BalanceService};
pub use models::{
    AccountBalance, Balance, Product, PurchaseReceipt, StockItem, StockStatus, TransactionKind,
    TransactionRecord, WorldInfo, BGL_RATE, DL_RATE,
};
pub use product::{validate_quantity, ProductService, MAX_QUANTITY};
pub use transaction::TransactionService;
