//! Error types for the cache

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache is closed")]
    Closed,
}
