use async_trait::async_trait;
use futures::FutureExt;
use notification_common::{
    retry_with_backoff, validate_phone_number, ChannelFlag, DeliveryState, NotificationChannel,
    OutboundMessage, ProviderError, RecipientOutcome, RetryConfig,
};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::client::KavenegarClient;
use crate::types::{delivery_state, SendEntry};

/// Kavenegar channel settings
#[derive(Debug, Clone, Deserialize)]
pub struct KavenegarConfig {
    pub api_token: String,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_priority() -> i32 {
    1
}

/// SMS channel (`sms` flag) backed by Kavenegar
pub struct KavenegarChannel {
    client: KavenegarClient,
    sender: Option<String>,
    priority: i32,
    retry: RetryConfig,
}

impl KavenegarChannel {
    pub const NAME: &'static str = "Kavenegar";

    pub fn new(config: KavenegarConfig) -> Result<Self, ProviderError> {
        if config.api_token.trim().is_empty() {
            return Err(ProviderError::InvalidConfiguration(
                "kavenegar api token is empty".to_string(),
            ));
        }
        Ok(Self {
            client: KavenegarClient::new(&config.api_token, config.base_url.as_deref())?,
            sender: config.sender.filter(|s| !s.trim().is_empty()),
            priority: config.priority,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Pair each sent receptor with its response entry.
///
/// Entries are matched by receptor first; when the gateway rewrote the number
/// format and the batch sizes agree, leftovers are matched by position.
fn correlate(sent: &[String], entries: Vec<SendEntry>) -> Vec<RecipientOutcome> {
    let positional = entries.len() == sent.len();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, entry) in entries.iter().enumerate() {
        index.entry(entry.receptor.clone()).or_insert(i);
    }
    let mut slots: Vec<Option<SendEntry>> = entries.into_iter().map(Some).collect();

    let mut matched: Vec<Option<SendEntry>> = sent
        .iter()
        .map(|receptor| index.remove(receptor).and_then(|i| slots[i].take()))
        .collect();
    if positional {
        for (i, entry) in matched.iter_mut().enumerate() {
            if entry.is_none() {
                *entry = slots[i].take();
            }
        }
    }

    sent.iter()
        .zip(matched)
        .map(|(receptor, entry)| match entry {
            Some(entry) => {
                RecipientOutcome::delivered(receptor.clone(), entry.messageid.to_string())
            }
            None => RecipientOutcome::failed(
                receptor.clone(),
                ProviderError::PermanentFailure {
                    message: "no delivery entry returned for receptor".to_string(),
                },
            ),
        })
        .collect()
}

#[async_trait]
impl NotificationChannel for KavenegarChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn flag(&self) -> ChannelFlag {
        ChannelFlag::Sms
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn send(&self, message: &OutboundMessage) -> Result<Vec<RecipientOutcome>, ProviderError> {
        let mut outcomes = Vec::with_capacity(message.receptors.len());
        let mut valid = Vec::with_capacity(message.receptors.len());

        for receptor in &message.receptors {
            match validate_phone_number(receptor) {
                Ok(()) => valid.push(receptor.clone()),
                Err(e) => {
                    warn!(receptor = %receptor, "Skipping invalid phone number: {}", e);
                    outcomes.push(RecipientOutcome::failed(
                        receptor.clone(),
                        ProviderError::InvalidRecipient {
                            address: receptor.clone(),
                            reason: e.to_string(),
                        },
                    ));
                }
            }
        }

        if valid.is_empty() {
            return Ok(outcomes);
        }

        let entries = self
            .client
            .send(&valid, &message.plain_text(), self.sender.as_deref())
            .await?;
        info!(
            requested = valid.len(),
            accepted = entries.len(),
            "Kavenegar SMS batch sent"
        );
        outcomes.extend(correlate(&valid, entries));
        Ok(outcomes)
    }

    async fn status(&self, delivery_ref: &str) -> Result<DeliveryState, ProviderError> {
        let client = self.client.clone();
        let message_id = delivery_ref.to_string();
        let entries = retry_with_backoff(&self.retry, || {
            let client = client.clone();
            let message_id = message_id.clone();
            async move { client.status(&message_id).await }.boxed()
        })
        .await?;

        entries
            .into_iter()
            .next()
            .map(|entry| delivery_state(entry.status))
            .ok_or_else(|| ProviderError::UnknownReference(delivery_ref.to_string()))
    }

    async fn verify(&self) -> Result<String, ProviderError> {
        let client = self.client.clone();
        let info = retry_with_backoff(&self.retry, || {
            let client = client.clone();
            async move { client.account_info().await }.boxed()
        })
        .await?;
        info!(remaining_credit = info.remaincredit, "Kavenegar account info");
        Ok(info.remaincredit.to_string())
    }
}
