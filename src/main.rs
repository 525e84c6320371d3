mod app_state;
mod config;
mod db;
mod error;
mod handlers;
mod ledger;
mod lightning;
mod payments;

use clap::Parser;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use app_state::AppState;
use config::Config;
use db::init_pool;
use payments::PaymentListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bitsatcredit_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse configuration
    let config = Arc::new(Config::parse());

    // Initialize database
    let pool = init_pool(&config.database_url, config.max_connections).await?;

    // Invoice backend
    let lightning = lightning::issuer_from_config(&config)?;

    // Payment bridge: webhook -> queue -> listener
    let (payments_tx, payments_rx) = mpsc::channel(config.event_queue_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener_handle = PaymentListener::new(pool.clone(), payments_rx, shutdown_rx).spawn();

    // Create shared state
    let state = AppState {
        pool: pool.clone(),
        config: config.clone(),
        lightning,
        payments: payments_tx,
    };

    let app = handlers::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.socket_addr()).await?;

    tracing::info!("Server running on {}", config.socket_addr());
    tracing::info!("Invoice issuer: {}", config.issuer_kind());
    if let Some(base) = config.public_url.as_deref() {
        tracing::info!("Payment webhook: {}{}", base.trim_end_matches('/'), config::WEBHOOK_PATH);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let the listener finish queued settlements before the pool goes away
    let _ = shutdown_tx.send(true);
    if let Err(e) = listener_handle.await {
        tracing::error!("Payment listener task failed: {}", e);
    }
    pool.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
