use anyhow::Context;
use payment_service::config::PaymentConfig;
use payment_service::gateway::PaystackClient;
use payment_service::repo::PgContributionStore;
use payment_service::{router, AppState};
use sqlx::PgPool;
use std::{env, net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = PaymentConfig::from_env()?;
    let db_pool = PgPool::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    let store = Arc::new(PgContributionStore::new(db_pool));
    let gateway = Arc::new(
        PaystackClient::new(
            config.paystack_base_url.clone(),
            Duration::from_secs(config.initialize_timeout_secs),
        )
        .context("failed to build gateway client")?,
    );

    let state = AppState {
        config: Arc::new(config),
        store,
        gateway,
    };
    let app = router(state);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8091);
    let addr = SocketAddr::new(host.parse()?, port);
    println!("starting payment-service on {addr}");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
