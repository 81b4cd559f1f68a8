//! Lock Module
//!
//! Per-key asynchronous mutexes for serializing read-modify-write sequences
//! on shared resources (balances, stock, settings).
//!
//! Every acquisition is bounded by a timeout. A failed acquisition is a
//! `None`/`false` result that callers report as "busy", never a panic.

mod registry;
mod response;
mod table;

pub use registry::{
    KeyGuard, LockRegistry, LockStats, MultiGuard, ANSWERED_RETENTION, DEFAULT_LOCK_TIMEOUT,
    DEFAULT_RESPONSE_TIMEOUT,
};
pub use response::{RequestOrigin, ResponseOutcome};
