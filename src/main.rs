//! OpenSASE Storefront - cart, wishlist and order service

use anyhow::Result;
use opensase_storefront::api::{self, AppState};
use opensase_storefront::config::AppConfig;
use opensase_storefront::services::{Services, Settings};
use opensase_storefront::store::{MemoryStore, PgStore, Store};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    let cfg = AppConfig::from_env()?;

    let store: Arc<dyn Store> = match &cfg.database_url {
        Some(url) => {
            let pg = PgStore::connect(url, cfg.max_connections).await?;
            pg.migrate().await?;
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, state is kept in memory");
            Arc::new(MemoryStore::new())
        }
    };
    let nats = match &cfg.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events stay local");
                None
            }
        },
        None => None,
    };

    let services = Services::new(store, nats, Settings::from(&cfg));
    let app = api::router(AppState::new(services, &cfg.jwt_secret), cfg.request_timeout);

    let addr = cfg.bind_addr();
    tracing::info!("🚀 OpenSASE Storefront listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}
