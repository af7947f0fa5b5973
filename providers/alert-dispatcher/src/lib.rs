//! Alert Dispatcher
//!
//! Fans unsent alerts out to notification channels and follows every sent
//! message until the vendor reports a final delivery state, failing over to
//! an alternate channel with the same capability flag when a message stays
//! in flight for too long.
//!
//! Three periodic pipelines share one shape ([`periodic::PeriodicRunner`]):
//! - receptor refresh ([`receptors`]): group membership and contact addresses
//! - alert dispatch ([`alert_scheduler`]): claim, resolve, send, record
//! - message status ([`message_status`]): poll, count attempts, fail over

pub mod alert_scheduler;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod message_status;
pub mod model;
pub mod periodic;
pub mod postgres;
pub mod receptors;
pub mod registry;
pub mod store;

#[cfg(test)]
pub(crate) mod test_utilities;

pub use alert_scheduler::AlertDispatchJob;
pub use config::DispatcherConfig;
pub use dispatcher::AlertDispatcher;
pub use error::DispatcherError;
pub use message_status::MessageStatusJob;
pub use model::{Alert, GroupMembers, Member, Message, MessageStatus, Provider, ProviderRecord};
pub use periodic::{Job, PeriodicRunner, ScheduleConfig};
pub use postgres::PostgresStore;
pub use receptors::{ReceptorCache, ReceptorRefreshJob};
pub use registry::ProviderRegistry;
pub use store::{AlertClaim, AlertStore, MessageStore, ProviderStore, ReceptorStore};

// Re-export Result type for convenience
pub type Result<T> = std::result::Result<T, DispatcherError>;
