//! Carrier API boundary: the trait the worker talks to and a reqwest-backed
//! client for the real OGx HTTP service.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::cmf::types::{
    gateway_error_code, TransportType, MAX_MESSAGES_PER_RESPONSE, MAX_STATUS_IDS_PER_REQUEST,
};
use crate::cmf::MessageState;
use crate::config::CarrierConfig;
use crate::error::{GatewayError, Result};

/// One outbound message submission
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    #[serde(rename = "MessageID")]
    pub message_id: String,
    /// Wire-format message document, validated before it gets here
    #[serde(rename = "Message")]
    pub payload: serde_json::Value,
    #[serde(rename = "Transport", skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    #[serde(rename = "ErrorID")]
    pub error_id: u32,
    #[serde(rename = "Description", default)]
    pub description: Option<String>,
    #[serde(rename = "RetryAfter", default)]
    pub retry_after_secs: Option<u64>,
}

impl SubmitResponse {
    pub fn is_success(&self) -> bool {
        self.error_id == gateway_error_code::SUCCESS
    }

    pub fn is_rate_limited(&self) -> bool {
        self.error_id == gateway_error_code::SUBMIT_MESSAGE_RATE_EXCEEDED
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageStatus {
    #[serde(rename = "MessageID")]
    pub message_id: String,
    #[serde(rename = "State")]
    pub state_code: u8,
    #[serde(rename = "ErrorID", default)]
    pub error_id: u32,
}

impl MessageStatus {
    pub fn state(&self) -> Option<MessageState> {
        MessageState::from_code(self.state_code)
    }
}

/// One page of mobile-originated messages
#[derive(Debug, Clone, Deserialize)]
pub struct ReturnMessagesPage {
    #[serde(rename = "Messages", default)]
    pub messages: Vec<serde_json::Value>,
    /// High-watermark to pass to the next call
    #[serde(rename = "NextStartUTC", default)]
    pub next_start_utc: Option<String>,
    #[serde(rename = "More", default)]
    pub more: bool,
}

/// Credential exchange seam, kept separate from message operations so the
/// session handler can be tested without a carrier.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Exchange client credentials for a bearer token.
    async fn authenticate(&self, client_id: &str, client_secret: &str) -> Result<String>;
}

#[async_trait]
impl<T: Authenticator + ?Sized> Authenticator for std::sync::Arc<T> {
    async fn authenticate(&self, client_id: &str, client_secret: &str) -> Result<String> {
        (**self).authenticate(client_id, client_secret).await
    }
}

/// Message operations against the carrier.
#[async_trait]
pub trait CarrierApi: Send + Sync {
    async fn submit_message(&self, request: &SubmitRequest) -> Result<SubmitResponse>;

    async fn message_statuses(&self, ids: &[String]) -> Result<Vec<MessageStatus>>;

    /// Retrieve mobile-originated messages received since `from_utc`.
    async fn return_messages(&self, from_utc: &str) -> Result<ReturnMessagesPage>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct OgxHttpClient {
    http: reqwest::Client,
    config: CarrierConfig,
    token: RwLock<Option<String>>,
}

impl OgxHttpClient {
    pub fn new(config: CarrierConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            token: RwLock::new(None),
        }
    }

    async fn bearer_token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        let token = self
            .authenticate(&self.config.client_id, &self.config.client_secret)
            .await?;
        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token so the next call re-authenticates.
    pub async fn invalidate_token(&self) {
        *self.token.write().await = None;
    }

    /// Map HTTP-level throttling onto the rate-limit error before the body is
    /// even parsed. Retry-After falls back to the configured window.
    fn check_throttle(&self, status: StatusCode, retry_after: Option<u64>) -> Result<()> {
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(GatewayError::RateLimit {
                message: format!("carrier returned HTTP {}", status.as_u16()),
                retry_after_secs: retry_after.unwrap_or(self.config.window_seconds),
            });
        }
        Ok(())
    }
}

fn retry_after_header(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

#[async_trait]
impl Authenticator for OgxHttpClient {
    async fn authenticate(&self, client_id: &str, client_secret: &str) -> Result<String> {
        let url = format!("{}/auth/token", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::auth(format!(
                "token request failed with HTTP {}",
                response.status().as_u16()
            )));
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl CarrierApi for OgxHttpClient {
    async fn submit_message(&self, request: &SubmitRequest) -> Result<SubmitResponse> {
        let token = self.bearer_token().await?;
        let url = format!("{}/submit/messages", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;

        let retry_after = retry_after_header(&response);
        self.check_throttle(response.status(), retry_after)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.invalidate_token().await;
            return Err(GatewayError::auth("carrier rejected bearer token"));
        }

        let body: SubmitResponse = response.json().await?;
        if body.is_rate_limited() {
            return Err(GatewayError::RateLimit {
                message: "submit_message rate exceeded".to_string(),
                retry_after_secs: body
                    .retry_after_secs
                    .unwrap_or(self.config.window_seconds),
            });
        }
        Ok(body)
    }

    async fn message_statuses(&self, ids: &[String]) -> Result<Vec<MessageStatus>> {
        if ids.len() > MAX_STATUS_IDS_PER_REQUEST {
            return Err(GatewayError::protocol(format!(
                "status request limited to {MAX_STATUS_IDS_PER_REQUEST} message ids"
            )));
        }
        let token = self.bearer_token().await?;
        let url = format!("{}/messages/status", self.config.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("ids", ids.join(","))])
            .send()
            .await?;

        let retry_after = retry_after_header(&response);
        self.check_throttle(response.status(), retry_after)?;

        Ok(response.json().await?)
    }

    async fn return_messages(&self, from_utc: &str) -> Result<ReturnMessagesPage> {
        let token = self.bearer_token().await?;
        let url = format!("{}/messages/return", self.config.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("from_utc", from_utc.to_string()),
                ("max", MAX_MESSAGES_PER_RESPONSE.to_string()),
            ])
            .send()
            .await?;

        let retry_after = retry_after_header(&response);
        self.check_throttle(response.status(), retry_after)?;

        Ok(response.json().await?)
    }
}
