use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::types::{ChannelFlag, DeliveryState, OutboundMessage, RecipientOutcome};

/// Base trait that every notification channel must implement
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Unique provider name this channel registers under
    fn name(&self) -> &str;

    /// Capability flag of the medium this channel delivers through
    fn flag(&self) -> ChannelFlag;

    /// Default priority (lower value wins) used when the provider is first registered
    fn priority(&self) -> i32;

    /// Deliver `message` to every receptor.
    ///
    /// `Err` means nothing was attempted (bad credentials, vendor down before
    /// any recipient was tried). Otherwise one outcome per receptor is returned,
    /// keyed by address.
    async fn send(&self, message: &OutboundMessage) -> Result<Vec<RecipientOutcome>, ProviderError>;

    /// Query the delivery state of a previously returned delivery reference
    async fn status(&self, delivery_ref: &str) -> Result<DeliveryState, ProviderError>;

    /// Check credentials/connectivity; returns a short human-readable account summary
    async fn verify(&self) -> Result<String, ProviderError>;
}

/// Provider error types
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    // Retryable errors
    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimitExceeded { retry_after: Duration },

    #[error("Network timeout")]
    NetworkTimeout,

    #[error("Service unavailable")]
    ServiceUnavailable,

    #[error("Temporary failure: {message}")]
    TemporaryFailure { message: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    // Non-retryable errors
    #[error("Invalid API key or authentication")]
    InvalidAuthentication,

    #[error("Invalid recipient {address}: {reason}")]
    InvalidRecipient { address: String, reason: String },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unknown delivery reference: {0}")]
    UnknownReference(String),

    #[error("Permanent failure: {message}")]
    PermanentFailure { message: String },
}

impl ProviderError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimitExceeded { .. }
                | ProviderError::NetworkTimeout
                | ProviderError::ServiceUnavailable
                | ProviderError::TemporaryFailure { .. }
                | ProviderError::NetworkError(_)
        )
    }

    /// Get retry delay if applicable
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimitExceeded { retry_after } => Some(*retry_after),
            ProviderError::NetworkTimeout | ProviderError::ServiceUnavailable => {
                Some(Duration::from_secs(5))
            }
            ProviderError::TemporaryFailure { .. } => Some(Duration::from_secs(10)),
            _ => None,
        }
    }
}

/// Map a vendor HTTP status (and body excerpt) onto the error taxonomy
pub fn classify_http_status(status: u16, body: &str) -> ProviderError {
    let excerpt: String = body.chars().take(256).collect();
    match status {
        401 | 403 => ProviderError::InvalidAuthentication,
        408 | 504 => ProviderError::NetworkTimeout,
        429 => ProviderError::RateLimitExceeded {
            retry_after: Duration::from_secs(60),
        },
        502 | 503 => ProviderError::ServiceUnavailable,
        500..=599 => ProviderError::TemporaryFailure { message: excerpt },
        400 | 404 | 422 => ProviderError::MalformedPayload(excerpt),
        _ => ProviderError::PermanentFailure {
            message: format!("HTTP {}: {}", status, excerpt),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable_classification() {
        assert!(ProviderError::NetworkTimeout.is_retryable());
        assert!(ProviderError::ServiceUnavailable.is_retryable());
        assert!(ProviderError::TemporaryFailure {
            message: "test".to_string()
        }
        .is_retryable());

        assert!(!ProviderError::InvalidAuthentication.is_retryable());
        assert!(!ProviderError::MalformedPayload("test".to_string()).is_retryable());
        assert!(!ProviderError::InvalidRecipient {
            address: "x".to_string(),
            reason: "bad".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_http_status_mapping() {
        assert!(matches!(
            classify_http_status(401, ""),
            ProviderError::InvalidAuthentication
        ));
        assert!(classify_http_status(503, "busy").is_retryable());
        assert!(classify_http_status(500, "oops").is_retryable());
        assert!(!classify_http_status(418, "teapot").is_retryable());
        assert_eq!(
            classify_http_status(429, "").retry_delay(),
            Some(Duration::from_secs(60))
        );
    }
}
