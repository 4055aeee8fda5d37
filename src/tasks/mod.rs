//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is in use.
//!
//! # Tasks
//! - TTL Cleanup: Reaps expired cache entries at a configured interval

mod cleanup;

pub use cleanup::{spawn_cleanup_task, CleanupHandle};
