use anyhow::{Context, Result};
use common_crypto::WebhookSecret;
use std::env;
use tracing::warn;

/// Configuration built once at startup and carried in `AppState`; handlers
/// never read the process environment at call time.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Paystack secret key, used both as the API credential and as the
    /// webhook HMAC key. `None` means the operator has not configured it;
    /// endpoints refuse requests rather than the process refusing to boot.
    pub paystack_secret_key: Option<WebhookSecret>,
    pub paystack_base_url: String,
    pub database_url: String,
    pub initialize_timeout_secs: u64,
}

impl PaymentConfig {
    pub fn from_env() -> Result<Self> {
        let paystack_secret_key = env::var("PAYSTACK_SECRET_KEY")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(WebhookSecret::new);
        if paystack_secret_key.is_none() {
            warn!("PAYSTACK_SECRET_KEY is not set; payment endpoints will refuse requests");
        }

        let paystack_base_url = env::var("PAYSTACK_BASE_URL")
            .unwrap_or_else(|_| "https://api.paystack.co".to_string());
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let initialize_timeout_secs = env::var("PAYSTACK_TIMEOUT_SECONDS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(15);

        Ok(Self {
            paystack_secret_key,
            paystack_base_url,
            database_url,
            initialize_timeout_secs: initialize_timeout_secs.max(1),
        })
    }
}
