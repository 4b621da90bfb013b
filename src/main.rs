//! Storefront payment service - Main Application Entry Point
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build the PhonePe gateway (fails fast on missing credentials)
//! 5. Build the optional Razorpay and Stripe clients
//! 6. Spawn the reconciliation sweeper when enabled
//! 7. Build HTTP router and start server on configured port

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use storefront_payments::{
    AppState, build_router,
    config::Config,
    db,
    gateway::{PhonePeGateway, RazorpayClient, StripeClient},
    services::sweeper::ReconcileSweeper,
    store::PgTransactionStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let gateway = Arc::new(PhonePeGateway::from_config(&config)?);
    tracing::info!("PhonePe gateway configured");

    let store = Arc::new(PgTransactionStore::new(pool));
    let mut state = AppState::new(store.clone(), gateway.clone(), config.frontend_url.clone());

    match config.razorpay() {
        Some(razorpay) => {
            state = state.with_razorpay(Arc::new(RazorpayClient::new(razorpay)?));
            tracing::info!("Razorpay client configured");
        }
        None => tracing::info!("Razorpay not configured, order creation disabled"),
    }

    match config.stripe() {
        Some(stripe) => {
            state = state.with_stripe(Arc::new(StripeClient::new(stripe)?));
            tracing::info!("Stripe client configured");
        }
        None => tracing::info!("Stripe not configured, payment intents disabled"),
    }

    if let Some(key) = config.stripe_publishable_key() {
        state = state.with_stripe_publishable_key(key);
    }

    match config.admin_api_key() {
        Some(key) => state = state.with_admin_key(&key),
        None => tracing::warn!("ADMIN_API_KEY not set, privileged routes are disabled"),
    }

    if let Some(interval) = config.reconcile_interval() {
        let sweeper = ReconcileSweeper::new(store, gateway, interval, config.reconcile_min_age());
        tokio::spawn(sweeper.run());
    }

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
