use crate::types::{TelegramApiResponse, TelegramMessage, TelegramSendMessageRequest, TelegramUser};
use notification_common::{classify_http_status, ProviderError};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error, info};

pub const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

/// Telegram Bot API client
pub struct TelegramClient {
    http_client: Client,
    base_url: String,
    bot_token: String,
}

impl TelegramClient {
    pub fn new(bot_token: impl Into<String>, base_url: Option<String>) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                ProviderError::InvalidConfiguration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            bot_token: bot_token.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.bot_token, method)
    }

    /// Send an HTML message via the Bot API, returning the Telegram message id
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, ProviderError> {
        let request = TelegramSendMessageRequest {
            chat_id,
            text: text.to_string(),
            parse_mode: "HTML".to_string(),
            disable_web_page_preview: Some(true),
            disable_notification: Some(false),
        };

        debug!("Sending Telegram message to chat_id: {}", chat_id);

        let response = self
            .http_client
            .post(self.method_url("sendMessage"))
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let message: TelegramMessage = read_api_response(response).await?;
        info!(
            chat_id,
            message_id = message.message_id,
            "Successfully sent Telegram message"
        );
        Ok(message.message_id)
    }

    /// Get bot info
    pub async fn get_me(&self) -> Result<TelegramUser, ProviderError> {
        let response = self
            .http_client
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(map_transport_error)?;

        read_api_response(response).await
    }
}

fn map_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::NetworkTimeout
    } else {
        ProviderError::NetworkError(e.to_string())
    }
}

async fn read_api_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let status = response.status();
    let response_text = response.text().await.map_err(map_transport_error)?;

    debug!(
        "Telegram API response (status {}): {}",
        status, response_text
    );

    let api_response: TelegramApiResponse<T> = match serde_json::from_str(&response_text) {
        Ok(parsed) => parsed,
        Err(_) if !status.is_success() => {
            return Err(classify_http_status(status.as_u16(), &response_text))
        }
        Err(e) => {
            return Err(ProviderError::MalformedPayload(format!(
                "Failed to parse Telegram API response: {}",
                e
            )))
        }
    };

    if api_response.ok {
        return api_response.result.ok_or_else(|| {
            ProviderError::MalformedPayload("Telegram API response without result".to_string())
        });
    }

    let description = api_response
        .description
        .unwrap_or_else(|| "Unknown error".to_string());
    error!("Telegram API error: {}", description);

    let code = api_response.error_code.unwrap_or(status.as_u16());
    if code == 429 {
        let retry_after = api_response
            .parameters
            .and_then(|p| p.retry_after)
            .unwrap_or(30);
        return Err(ProviderError::RateLimitExceeded {
            retry_after: Duration::from_secs(retry_after),
        });
    }
    Err(classify_http_status(code, &description))
}
