//! Vinyl Store - storefront service

use std::sync::Arc;

use anyhow::Result;
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vinyl_store::api::{self, AppState, Dependencies};
use vinyl_store::events::EventPublisher;
use vinyl_store::payments::StripeProcessor;
use vinyl_store::repository::{PgOrderRepository, PgProductRepository};
use vinyl_store::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = PgPoolOptions::new().max_connections(10).connect(config.database_url.expose_secret()).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let events = EventPublisher::connect(config.nats_url.as_deref()).await;
    let processor = StripeProcessor::new(
        config.payment.api_base.clone(),
        config.payment.secret_key.clone(),
        config.payment.timeout,
    )?;

    let state = AppState::new(Dependencies {
        products: Arc::new(PgProductRepository::new(db.clone())),
        orders: Arc::new(PgOrderRepository::new(db)),
        processor: Arc::new(processor),
        events,
        pricing: config.pricing,
        currency: config.payment.currency.clone(),
        payment_timeout: config.payment.timeout,
    });

    let addr = config.socket_addr();
    tracing::info!("Vinyl Store listening on {addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, api::router(state)).await?;
    Ok(())
}
