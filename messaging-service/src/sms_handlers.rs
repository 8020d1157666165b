use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use common_auth::{ensure_role, AuthContext, AuthError, SMS_SENDER_ROLES};
use common_http_errors::ApiError;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::gateway::{SmsBatchRequest, SmsGatewayError};
use crate::repo::NewMessageLog;
use crate::AppState;

pub const MESSAGE_TYPE_SMS: &str = "sms";
pub const STATUS_SENT: &str = "sent";

/// Dispatch errors wrap the shared taxonomy in the `{success: false, error}`
/// envelope the portal expects from this endpoint.
#[derive(Debug)]
pub struct SmsError(pub ApiError);

impl From<ApiError> for SmsError {
    fn from(value: ApiError) -> Self {
        Self(value)
    }
}

impl IntoResponse for SmsError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let body = json!({ "success": false, "error": self.0.message() });
        let mut resp = (self.0.status(), Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(code) {
            resp.headers_mut().insert("X-Error-Code", val);
        }
        resp
    }
}

/// Recipients arrive either as bare phone strings or as `{phone, name}`
/// objects; both normalize to one canonical shape before any business logic.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RecipientInput {
    Phone(String),
    Entry {
        phone: String,
        #[serde(default)]
        name: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Recipient {
    pub phone: String,
    pub display_name: Option<String>,
}

impl RecipientInput {
    pub fn normalize(&self) -> Recipient {
        match self {
            RecipientInput::Phone(phone) => Recipient {
                phone: phone.trim().to_string(),
                display_name: None,
            },
            RecipientInput::Entry { phone, name } => Recipient {
                phone: phone.trim().to_string(),
                display_name: name
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string),
            },
        }
    }
}

impl Recipient {
    /// Display name for the delivery log, falling back to the phone number.
    pub fn display(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.phone)
    }
}

#[derive(Debug, Deserialize)]
pub struct SendSmsRequest {
    #[serde(default)]
    pub recipients: Vec<RecipientInput>,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "senderName")]
    pub sender_name: Option<String>,
}

/// Authorizes the caller against the profile store, submits one gateway
/// batch, and writes a delivery-log row per recipient on success.
pub async fn send_sms(
    State(state): State<AppState>,
    auth: Result<AuthContext, AuthError>,
    body: Bytes,
) -> Result<Json<Value>, SmsError> {
    let auth = auth.map_err(|err| {
        SmsError(ApiError::unauthorized("unauthorized", err.to_string()))
    })?;

    // Authorization gate, not just authentication: a valid token whose
    // profile is missing or under-privileged is still rejected, before any
    // gateway call or log write.
    let role = state
        .store
        .fetch_role(auth.claims.subject)
        .await
        .map_err(|err| {
            error!(error = %err, "profile role lookup failed");
            SmsError(ApiError::internal_generic())
        })?;
    if let Err(guard) = ensure_role(role.as_deref(), SMS_SENDER_ROLES) {
        let (_, message) = guard.into_response();
        warn!(subject = %auth.claims.subject, role = ?role, "sms dispatch forbidden");
        return Err(SmsError(ApiError::forbidden(message)));
    }

    let request: SendSmsRequest = serde_json::from_slice(&body).map_err(|_| {
        SmsError(ApiError::bad_request("invalid_json", "request body must be JSON"))
    })?;

    if request.recipients.is_empty() {
        return Err(SmsError(ApiError::bad_request(
            "invalid_recipients",
            "recipients must be a non-empty array",
        )));
    }
    let message = request.message.trim().to_string();
    if message.is_empty() {
        return Err(SmsError(ApiError::bad_request(
            "invalid_message",
            "message must not be empty",
        )));
    }

    let recipients: Vec<Recipient> = request
        .recipients
        .iter()
        .map(RecipientInput::normalize)
        .collect();

    let api_key = state.config.sms_api_key.as_deref().ok_or_else(|| {
        error!("SMS gateway API key is not configured");
        SmsError(ApiError::internal("SMS gateway API key is not configured"))
    })?;

    let sender = request
        .sender_name
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| state.config.default_sender.clone());

    let batch = SmsBatchRequest {
        message: message.clone(),
        sender,
        destinations: recipients
            .iter()
            .map(|recipient| recipient.phone.clone())
            .collect(),
    };

    let receipt = state
        .gateway
        .send_batch(api_key, &batch)
        .await
        .map_err(|err| match err {
            SmsGatewayError::Declined { label } => {
                warn!(label, "sms gateway declined batch");
                SmsError(ApiError::bad_gateway(label))
            }
            SmsGatewayError::Transport(message) => {
                error!(error = %message, "sms gateway unreachable");
                SmsError(ApiError::bad_gateway(message))
            }
        })?;

    let logs: Vec<NewMessageLog> = recipients
        .iter()
        .map(|recipient| NewMessageLog {
            sender_id: auth.claims.subject,
            recipient_phone: recipient.phone.clone(),
            body: format!("{}||NAME||{}", message, recipient.display()),
            message_type: MESSAGE_TYPE_SMS.to_string(),
            status: STATUS_SENT.to_string(),
        })
        .collect();

    state
        .store
        .insert_message_logs(&logs)
        .await
        .map_err(|err| {
            error!(error = %err, "failed to persist delivery log");
            SmsError(ApiError::internal_generic())
        })?;

    info!(sent = logs.len(), batch = ?receipt.batch_id, "sms batch dispatched");
    Ok(Json(json!({
        "success": true,
        "sent": logs.len(),
        "batch": receipt.batch_id,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_string_normalizes_without_name() {
        let input = RecipientInput::Phone(" 0241234567 ".to_string());
        let recipient = input.normalize();
        assert_eq!(recipient.phone, "0241234567");
        assert_eq!(recipient.display(), "0241234567");
    }

    #[test]
    fn entry_normalizes_with_name() {
        let input = RecipientInput::Entry {
            phone: "0241234567".to_string(),
            name: Some("Ama Mensah".to_string()),
        };
        let recipient = input.normalize();
        assert_eq!(recipient.display(), "Ama Mensah");
    }

    #[test]
    fn blank_name_falls_back_to_phone() {
        let input = RecipientInput::Entry {
            phone: "0241234567".to_string(),
            name: Some("   ".to_string()),
        };
        assert_eq!(input.normalize().display(), "0241234567");
    }

    #[test]
    fn mixed_shapes_deserialize() {
        let raw = r#"[ "0241234567", { "phone": "0209876543", "name": "Kofi" } ]"#;
        let inputs: Vec<RecipientInput> = serde_json::from_str(raw).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[1].normalize().display(), "Kofi");
    }
}
