use axum::body::to_bytes;
use axum::http::Request;
use axum::Router;
use bigdecimal::BigDecimal;
use chrono::Utc;
use common_crypto::{compute_signature, WebhookSecret};
use payment_service::config::PaymentConfig;
use payment_service::gateway::StubGateway;
use payment_service::repo::{Contribution, ContributionStatus, MemoryContributionStore};
use payment_service::webhook::SIGNATURE_HEADER;
use payment_service::{router, AppState};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "sk_test_webhook_secret";

fn app_with_store() -> (Router, Arc<MemoryContributionStore>) {
    let store = Arc::new(MemoryContributionStore::new());
    let state = AppState {
        config: Arc::new(PaymentConfig {
            paystack_secret_key: Some(WebhookSecret::new(SECRET)),
            paystack_base_url: "http://gateway.invalid".to_string(),
            database_url: "postgres://unused".to_string(),
            initialize_timeout_secs: 2,
        }),
        store: store.clone(),
        gateway: Arc::new(StubGateway::new()),
    };
    (router(state), store)
}

fn pending_contribution(reference: &str, amount_ghs: &str) -> Contribution {
    Contribution {
        id: Uuid::new_v4(),
        payment_reference: reference.to_string(),
        amount_ghs: BigDecimal::parse_bytes(amount_ghs.as_bytes(), 10).unwrap(),
        status: ContributionStatus::Pending.as_str().to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn signed_request(body: &str) -> Request<axum::body::Body> {
    let signature = compute_signature(&WebhookSecret::new(SECRET), body.as_bytes()).unwrap();
    Request::builder()
        .uri("/webhooks/paystack")
        .method("POST")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

fn charge_success(reference: &str, amount_minor: i64) -> String {
    json!({
        "event": "charge.success",
        "data": { "reference": reference, "amount": amount_minor, "currency": "GHS" }
    })
    .to_string()
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(resp.into_body(), 1024 * 16).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn matching_charge_completes_contribution() {
    let (app, store) = app_with_store();
    store.insert(pending_contribution("REF123", "50.00"));

    let resp = app
        .oneshot(signed_request(&charge_success("REF123", 5000)))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body = body_json(resp).await;
    assert_eq!(body["message"], "payment verified");
    assert_eq!(store.get("REF123").unwrap().status, "completed");
}

#[tokio::test]
async fn redelivery_is_idempotent() {
    let (app, store) = app_with_store();
    store.insert(pending_contribution("REF123", "50.00"));

    let payload = charge_success("REF123", 5000);
    let resp = app
        .clone()
        .oneshot(signed_request(&payload))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let first_settled_at = store.get("REF123").unwrap().updated_at;

    let resp = app.oneshot(signed_request(&payload)).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body = body_json(resp).await;
    assert_eq!(body["message"], "already processed");

    let record = store.get("REF123").unwrap();
    assert_eq!(record.status, "completed");
    assert_eq!(record.updated_at, first_settled_at);
}

#[tokio::test]
async fn amount_mismatch_fails_contribution() {
    let (app, store) = app_with_store();
    store.insert(pending_contribution("REF123", "50.00"));

    let resp = app
        .oneshot(signed_request(&charge_success("REF123", 4000)))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(
        resp.headers().get("X-Error-Code").unwrap(),
        "amount_mismatch"
    );
    let body = body_json(resp).await;
    assert_eq!(body["expected"], json!(50.0));
    assert_eq!(body["received"], json!(40.0));
    assert_eq!(store.get("REF123").unwrap().status, "failed");
}

#[tokio::test]
async fn failed_contribution_never_completes_afterwards() {
    let (app, store) = app_with_store();
    store.insert(pending_contribution("REF123", "50.00"));

    let resp = app
        .clone()
        .oneshot(signed_request(&charge_success("REF123", 4000)))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    // A matching redelivery after the mismatch cannot resurrect the record.
    let resp = app
        .oneshot(signed_request(&charge_success("REF123", 5000)))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(store.get("REF123").unwrap().status, "failed");
}

#[tokio::test]
async fn unknown_reference_is_not_found() {
    let (app, store) = app_with_store();
    let resp = app
        .oneshot(signed_request(&charge_success("NOPE", 5000)))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    assert_eq!(
        resp.headers().get("X-Error-Code").unwrap(),
        "unknown_reference"
    );
    assert!(store.get("NOPE").is_none());
}

#[tokio::test]
async fn missing_signature_header_is_unauthorized() {
    let (app, _store) = app_with_store();
    let req = Request::builder()
        .uri("/webhooks/paystack")
        .method("POST")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(charge_success("REF123", 5000)))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status().as_u16(), 401);
    assert_eq!(
        resp.headers().get("X-Error-Code").unwrap(),
        "missing_signature"
    );
}

#[tokio::test]
async fn invalid_signature_is_unauthorized() {
    let (app, store) = app_with_store();
    store.insert(pending_contribution("REF123", "50.00"));

    let body = charge_success("REF123", 5000);
    let wrong =
        compute_signature(&WebhookSecret::new("some-other-secret"), body.as_bytes()).unwrap();
    let req = Request::builder()
        .uri("/webhooks/paystack")
        .method("POST")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, wrong)
        .body(axum::body::Body::from(body))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status().as_u16(), 401);
    assert_eq!(store.get("REF123").unwrap().status, "pending");
}

#[tokio::test]
async fn other_events_are_acknowledged_without_writes() {
    let (app, store) = app_with_store();
    store.insert(pending_contribution("REF123", "50.00"));

    let body = json!({
        "event": "charge.dispute.create",
        "data": { "reference": "REF123", "amount": 5000 }
    })
    .to_string();
    let resp = app.oneshot(signed_request(&body)).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body = body_json(resp).await;
    assert_eq!(body["message"], "event ignored");
    assert_eq!(store.get("REF123").unwrap().status, "pending");
}

#[tokio::test]
async fn envelope_without_event_or_data_is_bad_request() {
    let (app, _store) = app_with_store();
    let resp = app
        .clone()
        .oneshot(signed_request(r#"{"data":{"reference":"REF123"}}"#))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let resp = app
        .oneshot(signed_request(r#"{"event":"charge.success"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn non_string_reference_is_bad_request() {
    let (app, _store) = app_with_store();
    let body = json!({
        "event": "charge.success",
        "data": { "reference": 12345, "amount": 5000 }
    })
    .to_string();
    let resp = app.oneshot(signed_request(&body)).await.unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(
        resp.headers().get("X-Error-Code").unwrap(),
        "invalid_reference"
    );
}

#[tokio::test]
#[ignore]
async fn pg_store_cas_applies_once() {
    use payment_service::repo::{ContributionStore, PgContributionStore};
    use sqlx::{Executor, PgPool};

    let dsn =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for this ignored test");
    let pool = PgPool::connect(&dsn).await.unwrap();
    // Ensure table exists for local runs
    pool.execute(
        r#"
    CREATE TABLE IF NOT EXISTS contributions (
        id UUID PRIMARY KEY,
        payment_reference TEXT UNIQUE NOT NULL,
        amount_ghs NUMERIC(12,2) NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    );
    "#,
    )
    .await
    .unwrap();

    let reference = format!("itest-{}", Uuid::new_v4());
    sqlx::query(
        "INSERT INTO contributions (id, payment_reference, amount_ghs, status)
         VALUES ($1, $2, 50.00, 'pending')",
    )
    .bind(Uuid::new_v4())
    .bind(&reference)
    .execute(&pool)
    .await
    .unwrap();

    let store = PgContributionStore::new(pool);
    let first = store
        .transition_if_pending(&reference, ContributionStatus::Completed)
        .await
        .unwrap();
    let second = store
        .transition_if_pending(&reference, ContributionStatus::Failed)
        .await
        .unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, 0);
    let record = store
        .find_by_reference(&reference)
        .await
        .unwrap()
        .expect("record present");
    assert_eq!(record.status, "completed");
}

#[tokio::test]
async fn non_post_method_is_rejected() {
    let (app, _store) = app_with_store();
    let req = Request::builder()
        .uri("/webhooks/paystack")
        .method("GET")
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status().as_u16(), 405);
}
