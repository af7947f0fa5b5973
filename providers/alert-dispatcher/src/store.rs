//! Repository contracts the dispatcher runs against
//!
//! [`crate::postgres::PostgresStore`] implements all four traits; tests use
//! in-memory doubles with the same claiming semantics.

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::model::{Alert, GroupMembers, Message, MessageStatus, ProviderRecord};
use crate::Result;

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Alerts whose dispatch has not been attempted yet
    async fn get_unsent_alerts(&self) -> Result<Vec<Alert>>;

    /// Lock the alert row for this worker.
    ///
    /// Returns `None` when the alert was already sent or another worker holds
    /// the lock (`SKIP LOCKED`). Dropping the claim without calling
    /// [`AlertClaim::mark_sent`] releases the row untouched.
    async fn claim_unsent_alert(&self, id: Uuid) -> Result<Option<Box<dyn AlertClaim>>>;
}

/// Exclusive hold on one unsent alert
#[async_trait]
pub trait AlertClaim: Send {
    fn alert_id(&self) -> Uuid;

    /// Flip `send_notif` and release the lock
    async fn mark_sent(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn add(&self, message: &Message) -> Result<()>;

    /// Persist status, attempt counter, response and timestamps of `message`
    async fn update_message(&self, message: &Message) -> Result<()>;

    /// Messages still in the non-terminal `Sent` state
    async fn list_not_finished_messages(&self) -> Result<Vec<Message>>;

    /// Record one status poll: set status and response, advance the attempt counter
    async fn update_message_status(
        &self,
        message: &mut Message,
        status: MessageStatus,
        response: &str,
    ) -> Result<()> {
        let now = Utc::now();
        message.status = status;
        message.response = response.to_string();
        message.attempt += 1;
        message.last_attempt = Some(now);
        message.updated_at = now;
        self.update_message(message).await
    }
}

#[async_trait]
pub trait ProviderStore: Send + Sync {
    /// Fails with `DuplicateProvider` when the name is taken
    async fn add_provider(&self, provider: &ProviderRecord) -> Result<()>;

    /// Overwrite description, priority and enabled flag; `ProviderNotFound` when absent
    async fn modify_provider(&self, provider: &ProviderRecord) -> Result<()>;

    async fn get_provider(&self, name: &str) -> Result<Option<ProviderRecord>>;

    /// Disable the named provider; `ProviderNotFound` when absent
    async fn set_status_false(&self, name: &str) -> Result<()>;

    /// Every provider ordered by priority, then registration order
    async fn get_providers(&self) -> Result<Vec<ProviderRecord>>;
}

#[async_trait]
pub trait ReceptorStore: Send + Sync {
    /// Every group with each member's per-channel contact addresses
    async fn group_members(&self) -> Result<Vec<GroupMembers>>;
}
