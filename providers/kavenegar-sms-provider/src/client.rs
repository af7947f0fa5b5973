use crate::types::{AccountInfo, ApiResponse, SendEntry, StatusEntry};
use notification_common::{classify_http_status, ProviderError};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

pub const DEFAULT_BASE_URL: &str = "https://api.kavenegar.com";

/// Kavenegar REST API client. Cheap to clone.
#[derive(Clone)]
pub struct KavenegarClient {
    http_client: Client,
    base_url: Arc<str>,
    api_token: Arc<str>,
}

impl KavenegarClient {
    pub fn new(api_token: &str, base_url: Option<&str>) -> Result<Self, ProviderError> {
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
            api_token: api_token.into(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}/{}", self.base_url, self.api_token, path)
    }

    /// Send one text to a batch of receptors
    pub async fn send(
        &self,
        receptors: &[String],
        message: &str,
        sender: Option<&str>,
    ) -> Result<Vec<SendEntry>, ProviderError> {
        let mut query = vec![
            ("receptor", receptors.join(",")),
            ("message", message.to_string()),
        ];
        if let Some(sender) = sender {
            query.push(("sender", sender.to_string()));
        }

        debug!(receptors = receptors.len(), "Sending Kavenegar SMS batch");
        self.get("sms/send.json", &query).await
    }

    pub async fn status(&self, message_id: &str) -> Result<Vec<StatusEntry>, ProviderError> {
        self.get("sms/status.json", &[("messageid", message_id.to_string())])
            .await
    }

    pub async fn account_info(&self) -> Result<AccountInfo, ProviderError> {
        self.get("account/info.json", &[]).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let response = self
            .http_client
            .get(self.endpoint(path))
            .query(query)
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

        let parsed: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !http_status.is_success() => {
                return Err(classify_http_status(http_status.as_u16(), &body))
            }
            Err(e) => {
                return Err(ProviderError::MalformedPayload(format!(
                    "Failed to parse Kavenegar response: {}",
                    e
                )))
            }
        };

        if parsed.meta.status != 200 {
            error!(
                path,
                status = parsed.meta.status,
                "Kavenegar API error: {}",
                parsed.meta.message
            );
            return Err(map_api_status(parsed.meta.status, &parsed.meta.message));
        }

        parsed.entries.ok_or_else(|| {
            ProviderError::MalformedPayload("Kavenegar response without entries".to_string())
        })
    }
}

/// Kavenegar reports application errors in `return.status`
fn map_api_status(status: u16, message: &str) -> ProviderError {
    match status {
        401 | 403 => ProviderError::InvalidAuthentication,
        411 => ProviderError::InvalidRecipient {
            address: String::new(),
            reason: message.to_string(),
        },
        418 => ProviderError::PermanentFailure {
            message: format!("insufficient credit: {}", message),
        },
        424 => ProviderError::UnknownReference(message.to_string()),
        other => classify_http_status(other, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_passes_batch_as_query() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/key/sms/send.json"))
            .and(query_param("receptor", "09120000001,09120000002"))
            .and(query_param("message", "firing:disk:full"))
            .and(query_param("sender", "10004346"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "return": {"status": 200, "message": "ok"},
                "entries": [
                    {"messageid": 1, "receptor": "09120000001", "status": 1, "statustext": "queued"},
                    {"messageid": 2, "receptor": "09120000002", "status": 1, "statustext": "queued"}
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = KavenegarClient::new("key", Some(&mock_server.uri())).unwrap();
        let entries = client
            .send(
                &["09120000001".to_string(), "09120000002".to_string()],
                "firing:disk:full",
                Some("10004346"),
            )
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].messageid, 2);
    }

    #[tokio::test]
    async fn test_invalid_key_maps_to_authentication_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/bad/account/info.json"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "return": {"status": 403, "message": "invalid api key"},
                "entries": null
            })))
            .mount(&mock_server)
            .await;

        let client = KavenegarClient::new("bad", Some(&mock_server.uri())).unwrap();
        let err = client.account_info().await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidAuthentication));
    }

    #[tokio::test]
    async fn test_non_json_gateway_error_is_retryable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/key/sms/status.json"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&mock_server)
            .await;

        let client = KavenegarClient::new("key", Some(&mock_server.uri())).unwrap();
        let err = client.status("1").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
