//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Maintenance: sweeps expired cache entries and prunes idle lock mutexes

mod cleanup;

pub use cleanup::{run_maintenance, spawn_cleanup_task};
