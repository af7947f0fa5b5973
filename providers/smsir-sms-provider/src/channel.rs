use async_trait::async_trait;
use futures::FutureExt;
use notification_common::{
    retry_with_backoff, validate_phone_number, ChannelFlag, DeliveryState, NotificationChannel,
    OutboundMessage, ProviderError, RecipientOutcome, RetryConfig,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::client::SmsirClient;
use crate::types::delivery_state;

/// sms.ir channel settings
#[derive(Debug, Clone, Deserialize)]
pub struct SmsirConfig {
    pub api_key: String,
    /// Dedicated sender line; the account default is used when unset
    #[serde(default)]
    pub line_number: Option<u64>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_priority() -> i32 {
    2
}

/// SMS channel (`sms` flag) backed by sms.ir
pub struct SmsirChannel {
    client: SmsirClient,
    line_number: Option<u64>,
    priority: i32,
    retry: RetryConfig,
}

impl SmsirChannel {
    pub const NAME: &'static str = "Smsir";

    pub fn new(config: SmsirConfig) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::InvalidConfiguration(
                "sms.ir api key is empty".to_string(),
            ));
        }
        Ok(Self {
            client: SmsirClient::new(&config.api_key, config.base_url.as_deref())?,
            line_number: config.line_number,
            priority: config.priority,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// sms.ir returns message ids in the order of the submitted mobiles
fn correlate(sent: &[String], message_ids: &[i64]) -> Vec<RecipientOutcome> {
    sent.iter()
        .enumerate()
        .map(|(i, mobile)| match message_ids.get(i) {
            Some(id) => RecipientOutcome::delivered(mobile.clone(), id.to_string()),
            None => RecipientOutcome::failed(
                mobile.clone(),
                ProviderError::PermanentFailure {
                    message: "no message id returned for mobile".to_string(),
                },
            ),
        })
        .collect()
}

#[async_trait]
impl NotificationChannel for SmsirChannel {
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

        let data = self
            .client
            .send_bulk(&valid, &message.plain_text(), self.line_number)
            .await?;
        info!(
            requested = valid.len(),
            accepted = data.message_ids.len(),
            pack_id = data.pack_id.as_deref().unwrap_or(""),
            "sms.ir bulk SMS sent"
        );
        outcomes.extend(correlate(&valid, &data.message_ids));
        Ok(outcomes)
    }

    async fn status(&self, delivery_ref: &str) -> Result<DeliveryState, ProviderError> {
        let client = self.client.clone();
        let message_id = delivery_ref.to_string();
        let report = retry_with_backoff(&self.retry, || {
            let client = client.clone();
            let message_id = message_id.clone();
            async move { client.report(&message_id).await }.boxed()
        })
        .await?;

        Ok(delivery_state(report.delivery_state))
    }

    async fn verify(&self) -> Result<String, ProviderError> {
        let client = self.client.clone();
        let credit = retry_with_backoff(&self.retry, || {
            let client = client.clone();
            async move { client.credit().await }.boxed()
        })
        .await?;
        info!(credit, "sms.ir account credit");
        Ok(credit.to_string())
    }
}
