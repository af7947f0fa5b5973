//! Message status reconciliation
//!
//! Polls the sending provider for every message still in `Sent`. Each
//! non-terminal poll advances the attempt counter; once `max_attempts` is
//! reached the text is resent through another active provider with the same
//! capability flag and the original is closed as `Failed`.

use async_trait::async_trait;
use notification_common::{DeliveryState, OutboundMessage};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::model::{Message, MessageStatus};
use crate::periodic::Job;
use crate::registry::ProviderRegistry;
use crate::store::MessageStore;
use crate::{DispatcherError, Result};

const RESPONSE_FAILED_OVER: &str = "max attempts reached, tried alternative provider";
const RESPONSE_NO_ALTERNATIVE: &str = "no alternative provider found";
const RESPONSE_PROVIDER_UNAVAILABLE: &str = "provider unavailable";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Delivered,
    Failed,
    /// Counted as one more attempt
    StillSent,
    /// Status query failed; message left untouched
    StatusUnavailable,
    /// Resent through the named provider
    FailedOver(String),
    NoAlternative,
    /// Already terminal
    Skipped,
}

pub struct MessageStatusJob {
    messages: Arc<dyn MessageStore>,
    registry: Arc<ProviderRegistry>,
    max_attempts: u32,
}

impl MessageStatusJob {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        registry: Arc<ProviderRegistry>,
        max_attempts: u32,
    ) -> Self {
        Self {
            messages,
            registry,
            max_attempts,
        }
    }

    pub async fn reconcile(&self, mut message: Message) -> Result<ReconcileOutcome> {
        if message.status.is_terminal() {
            return Ok(ReconcileOutcome::Skipped);
        }
        if message.attempt >= self.max_attempts {
            return self.fail_over(message).await;
        }

        let channel = match self.registry.channel(&message.provider) {
            Some(channel) if !message.sender_ref.is_empty() => channel,
            _ => {
                warn!(
                    message_id = %message.id,
                    provider = %message.provider,
                    "Provider unavailable for status query"
                );
                self.messages
                    .update_message_status(&mut message, MessageStatus::Sent, RESPONSE_PROVIDER_UNAVAILABLE)
                    .await?;
                return Ok(ReconcileOutcome::StillSent);
            }
        };

        let state = match channel.status(&message.sender_ref).await {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    message_id = %message.id,
                    provider = %message.provider,
                    "Status query failed: {}",
                    e
                );
                return Ok(ReconcileOutcome::StatusUnavailable);
            }
        };

        let (status, response, outcome) = match state {
            DeliveryState::Delivered => (MessageStatus::Delivered, "Delivered", ReconcileOutcome::Delivered),
            DeliveryState::Failed => (MessageStatus::Failed, "Failed", ReconcileOutcome::Failed),
            DeliveryState::Pending => (MessageStatus::Sent, "Sent", ReconcileOutcome::StillSent),
        };
        self.messages
            .update_message_status(&mut message, status, response)
            .await?;
        debug!(
            message_id = %message.id,
            provider = %message.provider,
            attempt = message.attempt,
            status = %status,
            "Message status updated"
        );
        Ok(outcome)
    }

    async fn fail_over(&self, mut message: Message) -> Result<ReconcileOutcome> {
        let flag = match self.registry.get_provider_by_name(&message.provider).await {
            Ok(provider) => Some(provider.flag()),
            Err(DispatcherError::ProviderNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let mut chain = message.providers.clone();
        if !chain.contains(&message.provider) {
            chain.push(message.provider.clone());
        }

        let alternative = match flag {
            Some(flag) => self.registry.pick(flag, &chain).await?,
            None => None,
        };
        let Some((alternative, channel)) =
            alternative.and_then(|p| p.channel.clone().map(|c| (p, c)))
        else {
            info!(
                message_id = %message.id,
                provider = %message.provider,
                "No alternative provider found"
            );
            self.messages
                .update_message_status(&mut message, MessageStatus::Failed, RESPONSE_NO_ALTERNATIVE)
                .await?;
            return Ok(ReconcileOutcome::NoAlternative);
        };

        let mut resent = Message::new(
            message.user_id.as_str(),
            message.group_name.as_str(),
            message.text.as_str(),
            message.receptor.as_str(),
            alternative.name(),
            chain,
        );
        resent.alert_id = message.alert_id;

        let outbound = OutboundMessage::resend(message.text.clone(), message.receptor.clone());
        let resent = match channel.send(&outbound).await {
            Ok(outcomes) => {
                let outcome = outcomes
                    .iter()
                    .position(|o| o.address == message.receptor)
                    .or(if outcomes.len() == 1 { Some(0) } else { None })
                    .map(|i| outcomes[i].result.clone());
                match outcome {
                    Some(Ok(delivery_ref)) => resent.with_sender_ref(delivery_ref),
                    Some(Err(e)) => resent.failed_with(e.to_string()),
                    None => resent.failed_with("no outcome reported by provider"),
                }
            }
            Err(e) => resent.failed_with(e.to_string()),
        };

        // Close the original first so a failed insert cannot leave it
        // pollable and resent again on the next tick.
        self.messages
            .update_message_status(&mut message, MessageStatus::Failed, RESPONSE_FAILED_OVER)
            .await?;
        self.messages.add(&resent).await?;

        info!(
            message_id = %message.id,
            new_message_id = %resent.id,
            provider = %message.provider,
            alternative = alternative.name(),
            status = %resent.status,
            "Message failed over to alternative provider"
        );
        Ok(ReconcileOutcome::FailedOver(alternative.name().to_string()))
    }
}

#[async_trait]
impl Job for MessageStatusJob {
    type Item = Message;

    fn name(&self) -> &'static str {
        "message-status"
    }

    fn key(&self, message: &Message) -> String {
        message.id.to_string()
    }

    async fn collect(&self) -> Result<Vec<Message>> {
        self.messages.list_not_finished_messages().await
    }

    async fn process(&self, message: Message) {
        let message_id = message.id;
        let provider = message.provider.clone();
        if let Err(e) = self.reconcile(message).await {
            error!(
                message_id = %message_id,
                provider = %provider,
                "Failed reconciling message: {}",
                e
            );
        }
    }
}
