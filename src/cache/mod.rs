//! Cache Module
//!
//! Cache engine with TTL expiration, tag grouping and LRU eviction under a
//! memory limit, writing through a pluggable storage backend.

mod accountant;
mod codec;
mod entry;
mod handle;
mod lru;
mod stats;
mod store;
mod tags;


// Re-export public types
pub use accountant::SizeAccountant;
pub use codec::{EntryCodec, CODEC_VERSION};
pub use entry::Entry;
pub use handle::{Cache, SetOptions};
pub use lru::LruTracker;
pub use stats::CacheStats;
pub use store::{CacheStore, KeyTtl};
pub use tags::TagIndex;

// == Public Constants ==
/// Fixed per-entry bookkeeping cost added to every size estimate
pub const ENTRY_OVERHEAD: u64 = 64;

/// Bytes in one megabyte of memory limit
pub const BYTES_PER_MB: u64 = 1024 * 1024;
