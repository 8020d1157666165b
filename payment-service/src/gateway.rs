use async_trait::async_trait;
use common_crypto::WebhookSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{message}")]
    Unauthorized { message: String },
    #[error("{message}")]
    Rejected {
        message: String,
        code: Option<String>,
    },
    #[error("{message}")]
    Upstream { message: String },
    #[error("gateway request failed: {0}")]
    Transport(String),
}

/// Outbound transaction-initialize request. Amount is in minor units
/// (pesewas), as the gateway expects.
#[derive(Debug, Clone, Serialize)]
pub struct InitializeRequest {
    pub email: String,
    pub amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub callback_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeData {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(
        &self,
        secret: &WebhookSecret,
        req: &InitializeRequest,
    ) -> Result<InitializeData, GatewayError>;
}

/// Gateway response envelope; present on both success and failure bodies.
#[derive(Debug, Default, Deserialize)]
struct PaystackEnvelope {
    #[serde(default)]
    status: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    data: Option<InitializeData>,
}

pub struct PaystackClient {
    http: reqwest::Client,
    base_url: String,
}

impl PaystackClient {
    /// The timeout bounds the whole initialize call; a hung gateway turns
    /// into a transport error instead of a stuck handler.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize(
        &self,
        secret: &WebhookSecret,
        req: &InitializeRequest,
    ) -> Result<InitializeData, GatewayError> {
        let resp = self
            .http
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(secret.expose())
            .json(req)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    GatewayError::Transport("transaction initialize timed out".to_string())
                } else {
                    GatewayError::Transport(err.to_string())
                }
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        let envelope: PaystackEnvelope = serde_json::from_str(&text).unwrap_or_default();
        let message = envelope
            .message
            .unwrap_or_else(|| format!("gateway returned HTTP {status}"));

        if status.as_u16() == 401 {
            return Err(GatewayError::Unauthorized { message });
        }
        if status.is_server_error() {
            return Err(GatewayError::Upstream { message });
        }
        if !status.is_success() || envelope.status == Some(false) {
            return Err(GatewayError::Rejected {
                message,
                code: envelope.code,
            });
        }

        envelope.data.ok_or(GatewayError::Upstream {
            message: "gateway response missing transaction data".to_string(),
        })
    }
}

/// In-process stand-in used by tests and local development.
pub struct StubGateway;

impl StubGateway {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StubGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn initialize(
        &self,
        _secret: &WebhookSecret,
        req: &InitializeRequest,
    ) -> Result<InitializeData, GatewayError> {
        Ok(InitializeData {
            authorization_url: format!("https://checkout.example.com/{}", req.reference),
            access_code: format!("{}-access", req.reference),
            reference: req.reference.clone(),
        })
    }
}
