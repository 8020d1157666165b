use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bigdecimal::ToPrimitive;
use bytes::Bytes;
use common_crypto::verify_signature;
use common_http_errors::ApiError;
use common_money::{minor_to_major, nearly_equal};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::repo::ContributionStatus;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Amounts within one pesewa of the expected value count as a match.
const AMOUNT_TOLERANCE_PESEWAS: i64 = 1;

#[derive(Deserialize)]
struct WebhookEnvelope {
    event: Option<String>,
    data: Option<Value>,
}

/// Reconciles a gateway webhook against the contribution it references.
///
/// Delivery is at-least-once, so every path here must be safe under
/// redelivery: terminal states absorb duplicates and the store transition is
/// conditioned on the record still being pending.
pub async fn handle_paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let secret = state.config.paystack_secret_key.as_ref().ok_or_else(|| {
        ApiError::service_unavailable("payment gateway secret key is not configured")
    })?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ApiError::unauthorized("missing_signature", "missing gateway signature header")
        })?;

    // Verify against the exact bytes received; parsing happens only after the
    // signature checks out.
    if !verify_signature(secret, &body, signature) {
        warn!("webhook signature mismatch");
        return Err(ApiError::unauthorized(
            "invalid_signature",
            "signature verification failed",
        ));
    }

    let envelope: WebhookEnvelope = serde_json::from_slice(&body).map_err(|_| {
        ApiError::bad_request("invalid_payload", "body is not a valid event envelope")
    })?;
    let (Some(event), Some(data)) = (envelope.event, envelope.data) else {
        return Err(ApiError::bad_request(
            "invalid_payload",
            "event and data are required",
        ));
    };

    // Other event types are acknowledged so the gateway stops redelivering
    // them; only successful charges drive a state transition.
    if event != "charge.success" {
        return Ok(Json(json!({ "message": "event ignored" })).into_response());
    }

    let reference = data
        .get("reference")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ApiError::bad_request("invalid_reference", "data.reference must be a string")
        })?;
    let amount_minor = data.get("amount").and_then(Value::as_i64).ok_or_else(|| {
        ApiError::bad_request(
            "invalid_amount",
            "data.amount must be an integer amount in pesewas",
        )
    })?;

    let contribution = state
        .store
        .find_by_reference(reference)
        .await
        .map_err(|err| {
            error!(error = %err, reference, "contribution lookup failed");
            ApiError::internal("contribution lookup failed")
        })?
        .ok_or_else(|| {
            ApiError::not_found(
                "unknown_reference",
                format!("no contribution matches reference {reference}"),
            )
        })?;

    // Redelivery of an already-settled charge is a success, not an error.
    if contribution.status == ContributionStatus::Completed.as_str() {
        info!(reference, "webhook redelivery for completed contribution");
        return Ok(Json(json!({ "message": "already processed" })).into_response());
    }

    let received = minor_to_major(amount_minor);
    let expected = contribution.amount_ghs.clone();

    if !nearly_equal(&expected, &received, AMOUNT_TOLERANCE_PESEWAS) {
        let rows = state
            .store
            .transition_if_pending(reference, ContributionStatus::Failed)
            .await
            .map_err(|err| {
                error!(error = %err, reference, "contribution update failed");
                ApiError::internal("contribution update failed")
            })?;
        warn!(
            reference,
            expected = %expected,
            received = %received,
            rows,
            "webhook amount mismatch"
        );
        let body = json!({
            "error": "amount mismatch",
            "expected": expected.to_f64(),
            "received": received.to_f64(),
        });
        let mut resp = (StatusCode::BAD_REQUEST, Json(body)).into_response();
        resp.headers_mut()
            .insert("X-Error-Code", HeaderValue::from_static("amount_mismatch"));
        return Ok(resp);
    }

    // Zero rows here means a concurrent delivery won the race; either way the
    // record is settled and the gateway gets its acknowledgment.
    let rows = state
        .store
        .transition_if_pending(reference, ContributionStatus::Completed)
        .await
        .map_err(|err| {
            error!(error = %err, reference, "contribution update failed");
            ApiError::internal("contribution update failed")
        })?;
    info!(reference, rows, "contribution completed");
    Ok(Json(json!({ "message": "payment verified" })).into_response())
}
