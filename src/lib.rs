//! tagcache - An embeddable key-value cache
//!
//! Provides TTL expiration, tag-based grouping and a memory budget over an
//! in-memory or on-disk storage backend.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use backend::{Backend, DiskBackend, MemoryBackend};
pub use cache::{Cache, CacheStats, KeyTtl, SetOptions};
pub use config::CacheConfig;
pub use error::{CacheError, Result, StorageError};
pub use tasks::{spawn_cleanup_task, CleanupHandle};
