use notification_common::{classify_http_status, ProviderError};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.resend.com";

#[derive(Debug, Serialize)]
pub struct SendEmailRequest<'a> {
    pub from: &'a str,
    pub to: Vec<&'a str>,
    pub subject: &'a str,
    pub text: &'a str,
    pub html: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendEmailResponse {
    pub id: String,
}

/// Stored email as returned by `GET /emails/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct EmailRecord {
    pub id: String,
    #[serde(default)]
    pub last_event: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Domain {
    pub name: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DomainList {
    #[serde(default)]
    pub data: Vec<Domain>,
}

#[derive(Debug, Deserialize)]
struct ResendError {
    #[serde(default)]
    message: String,
}

/// Resend API client. Cheap to clone.
#[derive(Clone)]
pub struct ResendClient {
    http_client: Client,
    base_url: Arc<str>,
    api_key: Arc<str>,
}

impl ResendClient {
    pub fn new(api_key: &str, base_url: Option<&str>) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
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

    pub async fn send(&self, request: &SendEmailRequest<'_>) -> Result<String, ProviderError> {
        let response: SendEmailResponse = self
            .execute(
                self.http_client
                    .post(format!("{}/emails", self.base_url))
                    .json(request),
            )
            .await?;
        debug!("Email sent with ID: {}", response.id);
        Ok(response.id)
    }

    pub async fn email(&self, id: &str) -> Result<EmailRecord, ProviderError> {
        self.execute(
            self.http_client
                .get(format!("{}/emails/{}", self.base_url, id)),
        )
        .await
        .map_err(|e| match e {
            ProviderError::MalformedPayload(_) => ProviderError::UnknownReference(id.to_string()),
            other => other,
        })
    }

    pub async fn domains(&self) -> Result<DomainList, ProviderError> {
        self.execute(self.http_client.get(format!("{}/domains", self.base_url)))
            .await
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProviderError> {
        let response = request
            .bearer_auth(self.api_key.as_ref())
            .send()
            .await
            .map_err(|e| {
                error!("Failed to reach Resend: {}", e);
                if e.is_timeout() {
                    ProviderError::NetworkTimeout
                } else {
                    ProviderError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            warn!("Resend rate limit exceeded, retry after {} seconds", retry_after);
            return Err(ProviderError::RateLimitExceeded {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ResendError>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            error!(status = status.as_u16(), "Resend API error: {}", message);
            return Err(classify_http_status(status.as_u16(), &message));
        }

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::MalformedPayload(format!("Failed to parse Resend response: {}", e))
        })
    }
}
