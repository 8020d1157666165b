use anyhow::{Context, Result};
use std::env;
use tracing::warn;

/// Configuration built once at startup and carried in `AppState`; handlers
/// never read the process environment at call time.
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    /// SMSOnlineGH API key. `None` means the operator has not configured it;
    /// the dispatch endpoint refuses requests rather than the process
    /// refusing to boot.
    pub sms_api_key: Option<String>,
    pub sms_base_url: String,
    /// Sender label used when the request does not carry one.
    pub default_sender: String,
    pub database_url: String,
}

impl MessagingConfig {
    pub fn from_env() -> Result<Self> {
        let sms_api_key = env::var("SMSONLINEGH_API_KEY")
            .ok()
            .filter(|value| !value.trim().is_empty());
        if sms_api_key.is_none() {
            warn!("SMSONLINEGH_API_KEY is not set; SMS dispatch will refuse requests");
        }

        let sms_base_url = env::var("SMSONLINEGH_BASE_URL")
            .unwrap_or_else(|_| "https://api.smsonlinegh.com".to_string());
        let default_sender =
            env::var("SMS_SENDER_NAME").unwrap_or_else(|_| "Constituency".to_string());
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        Ok(Self {
            sms_api_key,
            sms_base_url,
            default_sender,
            database_url,
        })
    }
}
