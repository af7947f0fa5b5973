use crate::types::{BulkSendData, BulkSendRequest, MessageReport, SmsirResponse};
use notification_common::{classify_http_status, ProviderError};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

pub const DEFAULT_BASE_URL: &str = "https://api.sms.ir";

/// sms.ir REST API client. Cheap to clone.
#[derive(Clone)]
pub struct SmsirClient {
    http_client: Client,
    base_url: Arc<str>,
    api_key: Arc<str>,
}

impl SmsirClient {
    pub fn new(api_key: &str, base_url: Option<&str>) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                ProviderError::InvalidConfiguration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .into(),
            api_key: api_key.into(),
        })
    }

    /// Send one text to a batch of mobiles through `line_number`
    pub async fn send_bulk(
        &self,
        mobiles: &[String],
        message: &str,
        line_number: Option<u64>,
    ) -> Result<BulkSendData, ProviderError> {
        debug!(mobiles = mobiles.len(), "Sending sms.ir bulk SMS");
        let request = self
            .http_client
            .post(format!("{}/v1/send/bulk", self.base_url))
            .json(&BulkSendRequest {
                mobiles,
                message_text: message,
                line_number,
            });
        self.execute(request).await
    }

    pub async fn report(&self, message_id: &str) -> Result<MessageReport, ProviderError> {
        let request = self
            .http_client
            .get(format!("{}/v1/send/{}", self.base_url, message_id));
        self.execute(request).await.map_err(|e| match e {
            ProviderError::MalformedPayload(_) => {
                ProviderError::UnknownReference(message_id.to_string())
            }
            other => other,
        })
    }

    /// Remaining account credit
    pub async fn credit(&self) -> Result<f64, ProviderError> {
        let request = self
            .http_client
            .get(format!("{}/v1/credit", self.base_url));
        self.execute(request).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProviderError> {
        let response = request
            .header("X-API-KEY", self.api_key.as_ref())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::NetworkTimeout
                } else {
                    ProviderError::NetworkError(e.to_string())
                }
            })?;

        let http_status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !http_status.is_success() {
            let message = serde_json::from_str::<SmsirResponse<serde_json::Value>>(&body)
                .map(|parsed| parsed.message)
                .unwrap_or(body);
            error!(status = http_status.as_u16(), "sms.ir API error: {}", message);
            return Err(classify_http_status(http_status.as_u16(), &message));
        }

        let parsed: SmsirResponse<T> = serde_json::from_str(&body).map_err(|e| {
            ProviderError::MalformedPayload(format!("Failed to parse sms.ir response: {}", e))
        })?;

        if parsed.status != 1 {
            error!(status = parsed.status, "sms.ir rejected request: {}", parsed.message);
            return Err(ProviderError::PermanentFailure {
                message: format!("sms.ir status {}: {}", parsed.status, parsed.message),
            });
        }

        parsed.data.ok_or_else(|| {
            ProviderError::MalformedPayload("sms.ir response without data".to_string())
        })
    }
}
