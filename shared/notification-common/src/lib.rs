//! Shared types and utilities for notification channels
//!
//! Every vendor integration implements [`NotificationChannel`]; the dispatcher
//! only ever talks to vendors through that trait.

pub mod provider_base;
pub mod retry;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use provider_base::{classify_http_status, NotificationChannel, ProviderError};
pub use retry::{retry_with_backoff, IsRetryable, RetryConfig};
pub use types::*;
pub use validation::*;
