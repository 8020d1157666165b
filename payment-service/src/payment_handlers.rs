use axum::extract::State;
use axum::Json;
use bytes::Bytes;
use common_http_errors::ApiError;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::gateway::{GatewayError, InitializeRequest};
use crate::AppState;

/// Gateway minimum charge in minor units (pesewas).
const MIN_AMOUNT_MINOR: i64 = 100;

/// Validates a checkout request and asks the gateway for an authorization
/// URL. Nothing is persisted here; the portal creates the pending
/// contribution record alongside this call and the webhook settles it.
pub async fn initialize_payment(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::bad_request("invalid_json", "request body must be JSON"))?;

    let email = non_empty_str(&payload, "email");
    let reference = non_empty_str(&payload, "reference");
    let callback_url = non_empty_str(&payload, "callback_url");
    let amount_field = payload.get("amount");

    if email.is_none() || reference.is_none() || callback_url.is_none() || amount_field.is_none() {
        return Err(ApiError::bad_request(
            "missing_fields",
            "email, amount, reference, and callback_url are required",
        ));
    }

    let amount = amount_field
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            ApiError::bad_request("invalid_amount", "amount must be an integer number of pesewas")
        })?;
    if amount < MIN_AMOUNT_MINOR {
        return Err(ApiError::bad_request(
            "invalid_amount",
            format!("amount must be at least {MIN_AMOUNT_MINOR} pesewas"),
        ));
    }

    // Operator misconfiguration, distinguished from client error so deploys
    // missing the secret are detected quickly.
    let secret = state.config.paystack_secret_key.as_ref().ok_or_else(|| {
        ApiError::service_unavailable("payment gateway secret key is not configured")
    })?;

    let request = InitializeRequest {
        email: email.unwrap_or_default().to_string(),
        amount,
        currency: payload
            .get("currency")
            .and_then(Value::as_str)
            .map(str::to_string),
        reference: reference.unwrap_or_default().to_string(),
        channels: payload.get("channels").and_then(Value::as_array).map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        }),
        metadata: payload.get("metadata").cloned(),
        callback_url: callback_url.unwrap_or_default().to_string(),
    };

    let data = state
        .gateway
        .initialize(secret, &request)
        .await
        .map_err(|err| {
            warn!(error = %err, reference = %request.reference, "transaction initialize failed");
            match err {
                GatewayError::Unauthorized { message } => {
                    ApiError::unauthorized("gateway_unauthorized", message)
                }
                GatewayError::Rejected { message, code } => ApiError::bad_request(
                    "gateway_rejected",
                    match code {
                        Some(code) => format!("{message} ({code})"),
                        None => message,
                    },
                ),
                GatewayError::Upstream { message } => ApiError::bad_gateway(message),
                GatewayError::Transport(message) => ApiError::bad_gateway(message),
            }
        })?;

    info!(reference = %data.reference, "transaction initialized");
    Ok(Json(json!({
        "authorization_url": data.authorization_url,
        "access_code": data.access_code,
        "reference": data.reference,
    })))
}

fn non_empty_str<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
