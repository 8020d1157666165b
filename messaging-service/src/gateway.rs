use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SmsGatewayError {
    /// The gateway answered but did not accept the batch. The label is its
    /// own error string, surfaced to operators as a 502.
    #[error("{label}")]
    Declined { label: String },
    #[error("gateway request failed: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SmsBatchRequest {
    pub message: String,
    pub sender: String,
    pub destinations: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SmsBatchReceipt {
    pub batch_id: Option<String>,
}

#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send_batch(
        &self,
        api_key: &str,
        req: &SmsBatchRequest,
    ) -> Result<SmsBatchReceipt, SmsGatewayError>;
}

/// Gateway response envelope. The handshake label is authoritative: the
/// gateway returns HTTP 200 even for rejected batches, so HTTP status alone
/// must not be trusted.
#[derive(Debug, Default, Deserialize)]
struct SmsEnvelope {
    #[serde(default)]
    handshake: Option<Handshake>,
    #[serde(default)]
    data: Option<SmsData>,
}

#[derive(Debug, Deserialize)]
struct Handshake {
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SmsData {
    #[serde(default)]
    batch: Option<String>,
}

const HANDSHAKE_OK: &str = "HSHK_OK";

pub struct SmsOnlineClient {
    http: reqwest::Client,
    base_url: String,
}

impl SmsOnlineClient {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl SmsGateway for SmsOnlineClient {
    async fn send_batch(
        &self,
        api_key: &str,
        req: &SmsBatchRequest,
    ) -> Result<SmsBatchReceipt, SmsGatewayError> {
        let payload = serde_json::json!({
            "text": req.message,
            "type": 0,
            "sender": req.sender,
            "destinations": req.destinations,
        });

        let resp = self
            .http
            .post(format!("{}/v4/message/sms/send", self.base_url))
            .header("Authorization", format!("key {api_key}"))
            .json(&payload)
            .send()
            .await
            .map_err(|err| SmsGatewayError::Transport(err.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|err| SmsGatewayError::Transport(err.to_string()))?;
        let envelope: SmsEnvelope = serde_json::from_str(&text).unwrap_or_default();

        let label = envelope
            .handshake
            .and_then(|handshake| handshake.label)
            .unwrap_or_else(|| format!("no handshake in gateway response (HTTP {status})"));
        if label != HANDSHAKE_OK {
            return Err(SmsGatewayError::Declined { label });
        }

        Ok(SmsBatchReceipt {
            batch_id: envelope.data.and_then(|data| data.batch),
        })
    }
}

/// In-process stand-in used by tests; records every batch it accepts.
pub struct StubSmsGateway {
    decline_label: Option<String>,
    batch_id: Option<String>,
    calls: Mutex<Vec<SmsBatchRequest>>,
}

impl StubSmsGateway {
    pub fn acknowledging(batch_id: impl Into<String>) -> Self {
        Self {
            decline_label: None,
            batch_id: Some(batch_id.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn declining(label: impl Into<String>) -> Self {
        Self {
            decline_label: Some(label.into()),
            batch_id: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<SmsBatchRequest> {
        self.calls.lock().expect("mutex poisoned").clone()
    }
}

#[async_trait]
impl SmsGateway for StubSmsGateway {
    async fn send_batch(
        &self,
        _api_key: &str,
        req: &SmsBatchRequest,
    ) -> Result<SmsBatchReceipt, SmsGatewayError> {
        if let Some(label) = &self.decline_label {
            return Err(SmsGatewayError::Declined {
                label: label.clone(),
            });
        }
        self.calls.lock().expect("mutex poisoned").push(req.clone());
        Ok(SmsBatchReceipt {
            batch_id: self.batch_id.clone(),
        })
    }
}
