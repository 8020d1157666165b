use std::sync::Arc;

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderName, Method,
};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub mod config;
pub mod gateway;
pub mod payment_handlers;
pub mod repo;
pub mod webhook;

use config::PaymentConfig;
use gateway::PaymentGateway;
use repo::ContributionStore;

pub const SERVICE_NAME: &str = "payment-service";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PaymentConfig>,
    pub store: Arc<dyn ContributionStore>,
    pub gateway: Arc<dyn PaymentGateway>,
}

/// Router shared by `main` and the integration tests. CORS is permissive:
/// the public site and the portal are served from arbitrary origins and the
/// browser preflights both endpoints.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            ACCEPT,
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static("x-paystack-signature"),
        ]);

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(common_observability::render_metrics))
        .route("/payments/initialize", post(payment_handlers::initialize_payment))
        .route("/webhooks/paystack", post(webhook::handle_paystack_webhook))
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(
            SERVICE_NAME,
            common_observability::track_http_errors,
        ))
        .layer(cors)
}
