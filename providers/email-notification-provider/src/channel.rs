use async_trait::async_trait;
use futures::FutureExt;
use notification_common::{
    retry_with_backoff, validate_email, ChannelFlag, DeliveryState, NotificationChannel,
    OutboundMessage, ProviderError, RecipientOutcome, RetryConfig,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::client::{ResendClient, SendEmailRequest};
use crate::formatter::format_email;

/// Resend channel settings
#[derive(Debug, Clone, Deserialize)]
pub struct ResendConfig {
    pub api_key: String,
    /// Sender address on a domain verified with Resend
    pub from: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_priority() -> i32 {
    2
}

/// Mail channel (`mail` flag) backed by Resend
pub struct ResendChannel {
    client: ResendClient,
    from: String,
    priority: i32,
    retry: RetryConfig,
}

impl ResendChannel {
    pub const NAME: &'static str = "Resend";

    pub fn new(config: ResendConfig) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::InvalidConfiguration(
                "resend api key is empty".to_string(),
            ));
        }
        if config.from.trim().is_empty() {
            return Err(ProviderError::InvalidConfiguration(
                "resend sender address is empty".to_string(),
            ));
        }
        Ok(Self {
            client: ResendClient::new(&config.api_key, config.base_url.as_deref())?,
            from: config.from,
            priority: config.priority,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Errors that concern one recipient rather than the whole channel
fn is_recipient_error(error: &ProviderError) -> bool {
    matches!(
        error,
        ProviderError::InvalidRecipient { .. } | ProviderError::MalformedPayload(_)
    )
}

/// Map Resend's `last_event` onto the shared delivery state
fn delivery_state(last_event: Option<&str>) -> DeliveryState {
    match last_event {
        Some("delivered") | Some("opened") | Some("clicked") | Some("complained") => {
            DeliveryState::Delivered
        }
        Some("bounced") | Some("failed") | Some("canceled") => DeliveryState::Failed,
        _ => DeliveryState::Pending,
    }
}

#[async_trait]
impl NotificationChannel for ResendChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn flag(&self) -> ChannelFlag {
        ChannelFlag::Mail
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    /// One email per recipient. A channel-level failure before anything was
    /// accepted fails the whole send so the caller can fail over.
    async fn send(&self, message: &OutboundMessage) -> Result<Vec<RecipientOutcome>, ProviderError> {
        let content = format_email(message);
        let mut outcomes = Vec::with_capacity(message.receptors.len());
        let mut accepted = 0usize;

        for receptor in &message.receptors {
            if let Err(e) = validate_email(receptor) {
                warn!(receptor = %receptor, "Skipping invalid email address: {}", e);
                outcomes.push(RecipientOutcome::failed(
                    receptor.clone(),
                    ProviderError::InvalidRecipient {
                        address: receptor.clone(),
                        reason: e.to_string(),
                    },
                ));
                continue;
            }

            let request = SendEmailRequest {
                from: &self.from,
                to: vec![receptor.as_str()],
                subject: &content.subject,
                text: &content.text,
                html: &content.html,
            };
            match self.client.send(&request).await {
                Ok(id) => {
                    accepted += 1;
                    outcomes.push(RecipientOutcome::delivered(receptor.clone(), id));
                }
                Err(e) if accepted == 0 && !is_recipient_error(&e) => return Err(e),
                Err(e) => outcomes.push(RecipientOutcome::failed(receptor.clone(), e)),
            }
        }

        info!(
            requested = message.receptors.len(),
            accepted, "Resend emails sent"
        );
        Ok(outcomes)
    }

    async fn status(&self, delivery_ref: &str) -> Result<DeliveryState, ProviderError> {
        let client = self.client.clone();
        let id = delivery_ref.to_string();
        let record = retry_with_backoff(&self.retry, || {
            let client = client.clone();
            let id = id.clone();
            async move { client.email(&id).await }.boxed()
        })
        .await?;

        Ok(delivery_state(record.last_event.as_deref()))
    }

    async fn verify(&self) -> Result<String, ProviderError> {
        let client = self.client.clone();
        let domains = retry_with_backoff(&self.retry, || {
            let client = client.clone();
            async move { client.domains().await }.boxed()
        })
        .await?;

        let verified: Vec<&str> = domains
            .data
            .iter()
            .filter(|d| d.status == "verified")
            .map(|d| d.name.as_str())
            .collect();
        if verified.is_empty() {
            warn!("No verified Resend domain, emails will be rejected");
        }
        info!(domains = verified.len(), "Resend account verified");
        Ok(format!("{} verified domains", verified.len()))
    }
}
