//! Bounded in-memory cache with LRU eviction and per-entry expiry
//!
//! Every component of the dispatcher keeps its own typed [`Cache`] instance
//! (provider views, receptor maps) instead of sharing one process-wide map.
//! Capacity eviction and TTL expiry are independent: an entry leaves the cache
//! when it is the least recently used one and room is needed, or when its
//! deadline has passed, whichever happens first.

mod cache;
mod error;
mod expiry;
mod lru;
mod options;
mod sweeper;

pub use cache::Cache;
pub use error::CacheError;
pub use options::CacheOptions;

/// TTL value meaning "never expires".
pub const NO_EXPIRY: std::time::Duration = std::time::Duration::ZERO;

pub type Result<T> = std::result::Result<T, CacheError>;
