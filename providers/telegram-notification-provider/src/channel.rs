use async_trait::async_trait;
use notification_common::{
    ChannelFlag, DeliveryState, NotificationChannel, OutboundMessage,
    ProviderError, RecipientOutcome,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::formatter::format_telegram_message;
use crate::telegram_client::TelegramClient;

/// Telegram channel settings
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_priority() -> i32 {
    3
}

/// Telegram Bot API channel (`telegram` flag)
pub struct TelegramChannel {
    client: TelegramClient,
    priority: i32,
}

impl TelegramChannel {
    pub const NAME: &'static str = "Telegram";

    pub fn new(config: TelegramConfig) -> Result<Self, ProviderError> {
        if config.bot_token.trim().is_empty() {
            return Err(ProviderError::InvalidConfiguration(
                "telegram bot token is empty".to_string(),
            ));
        }
        Ok(Self {
            client: TelegramClient::new(config.bot_token, config.base_url)?,
            priority: config.priority,
        })
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn flag(&self) -> ChannelFlag {
        ChannelFlag::Telegram
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn send(&self, message: &OutboundMessage) -> Result<Vec<RecipientOutcome>, ProviderError> {
        let text = format_telegram_message(message);
        let mut outcomes = Vec::with_capacity(message.receptors.len());

        for receptor in &message.receptors {
            let chat_id = match receptor.trim().parse::<i64>() {
                Ok(id) => id,
                Err(e) => {
                    warn!(receptor = %receptor, "Cannot parse chat id: {}", e);
                    outcomes.push(RecipientOutcome::failed(
                        receptor.clone(),
                        ProviderError::InvalidRecipient {
                            address: receptor.clone(),
                            reason: e.to_string(),
                        },
                    ));
                    continue;
                }
            };

            match self.client.send_message(chat_id, &text).await {
                Ok(message_id) => {
                    outcomes.push(RecipientOutcome::delivered(
                        receptor.clone(),
                        message_id.to_string(),
                    ));
                }
                // A rejected token fails every remaining recipient the same way.
                Err(ProviderError::InvalidAuthentication) => {
                    return Err(ProviderError::InvalidAuthentication)
                }
                Err(e) => {
                    warn!(chat_id, "Error sending telegram message: {}", e);
                    outcomes.push(RecipientOutcome::failed(receptor.clone(), e));
                }
            }
        }

        Ok(outcomes)
    }

    /// The Bot API has no delivery receipts; an accepted message is final.
    async fn status(&self, _delivery_ref: &str) -> Result<DeliveryState, ProviderError> {
        Ok(DeliveryState::Delivered)
    }

    async fn verify(&self) -> Result<String, ProviderError> {
        let me = self.client.get_me().await?;
        let handle = me
            .username
            .map(|u| format!("@{}", u))
            .unwrap_or_else(|| me.first_name.clone());
        info!(bot = %handle, "Telegram bot verified");
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notification_common::AlertState;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel(server: &MockServer) -> TelegramChannel {
        TelegramChannel::new(TelegramConfig {
            bot_token: "tok".to_string(),
            priority: 3,
            base_url: Some(server.uri()),
        })
        .unwrap()
    }

    fn message(receptors: &[&str]) -> OutboundMessage {
        OutboundMessage {
            subject: "HighLatency".to_string(),
            body: "p99 above 2s".to_string(),
            state: Some(AlertState::Firing),
            time: None,
            receptors: receptors.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_send_reports_outcome_per_chat() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/bottok/sendMessage"))
            .and(body_partial_json(json!({"chat_id": 100})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 11, "date": 0, "chat": {"id": 100, "type": "private"}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bottok/sendMessage"))
            .and(body_partial_json(json!({"chat_id": 200})))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let outcomes = channel(&server)
            .send(&message(&["100", "200", "not-a-chat"]))
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].address, "100");
        assert_eq!(outcomes[0].result.as_deref().ok(), Some("11"));
        assert_eq!(outcomes[1].address, "200");
        assert!(outcomes[1].result.is_err());
        assert!(matches!(
            outcomes[2].result,
            Err(ProviderError::InvalidRecipient { .. })
        ));
    }

    #[tokio::test]
    async fn test_bad_token_fails_whole_send() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/bottok/sendMessage"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "ok": false, "error_code": 401, "description": "Unauthorized"
            })))
            .mount(&server)
            .await;

        let result = channel(&server).send(&message(&["1", "2"])).await;
        assert!(matches!(result, Err(ProviderError::InvalidAuthentication)));
    }

    #[tokio::test]
    async fn test_verify_returns_bot_handle() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bottok/getMe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"id": 1, "is_bot": true, "first_name": "Iris", "username": "iris_alert_bot"}
            })))
            .mount(&server)
            .await;

        let handle = channel(&server).verify().await.unwrap();
        assert_eq!(handle, "@iris_alert_bot");
        assert_eq!(
            channel(&server).status("11").await.unwrap(),
            DeliveryState::Delivered
        );
    }

    #[test]
    fn test_empty_token_rejected() {
        let result = TelegramChannel::new(TelegramConfig {
            bot_token: " ".to_string(),
            priority: 3,
            base_url: None,
        });
        assert!(matches!(result, Err(ProviderError::InvalidConfiguration(_))));
    }
}
