use std::sync::Arc;

use axum::extract::FromRef;
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use axum::routing::{get, post};
use axum::Router;
use common_auth::JwtVerifier;
use tower_http::cors::{Any, CorsLayer};

pub mod config;
pub mod gateway;
pub mod repo;
pub mod sms_handlers;

use config::MessagingConfig;
use gateway::SmsGateway;
use repo::MessagingStore;

pub const SERVICE_NAME: &str = "messaging-service";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<MessagingConfig>,
    pub jwt_verifier: Arc<JwtVerifier>,
    pub store: Arc<dyn MessagingStore>,
    pub gateway: Arc<dyn SmsGateway>,
}

impl FromRef<AppState> for Arc<JwtVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt_verifier.clone()
    }
}

/// Router shared by `main` and the integration tests.
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
        .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION]);

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(common_observability::render_metrics))
        .route("/messages/sms", post(sms_handlers::send_sms))
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(
            SERVICE_NAME,
            common_observability::track_http_errors,
        ))
        .layer(cors)
}
