//! Error types for the alert dispatcher

use notification_common::ProviderError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DispatcherError {
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Alert not found: {0}")]
    AlertNotFound(Uuid),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Provider already exists: {0}")]
    DuplicateProvider(String),

    #[error("Invalid priority {0}: allowed range 1-5")]
    InvalidPriority(i32),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Channel error: {0}")]
    Channel(#[from] ProviderError),

    #[error("{0} scheduler already started")]
    AlreadyStarted(&'static str),
}

impl DispatcherError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatcherError::Store(_) => true,
            DispatcherError::Channel(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DispatcherError::ProviderNotFound(_)
                | DispatcherError::AlertNotFound(_)
                | DispatcherError::GroupNotFound(_)
        )
    }
}

impl From<tokio_postgres::Error> for DispatcherError {
    fn from(err: tokio_postgres::Error) -> Self {
        DispatcherError::Store(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for DispatcherError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        DispatcherError::Store(format!("connection pool: {}", err))
    }
}

impl From<envy::Error> for DispatcherError {
    fn from(err: envy::Error) -> Self {
        DispatcherError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(DispatcherError::Store("connection reset".into()).is_retryable());
        assert!(DispatcherError::Channel(ProviderError::NetworkTimeout).is_retryable());
        assert!(!DispatcherError::Channel(ProviderError::InvalidAuthentication).is_retryable());
        assert!(!DispatcherError::ProviderNotFound("Kavenegar".into()).is_retryable());
        assert!(DispatcherError::GroupNotFound("ops".into()).is_not_found());
    }
}
