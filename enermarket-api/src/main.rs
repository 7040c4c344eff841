use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use enermarket_api::{app, AppState};
use enermarket_core::{MarketStore, SystemClock};
use enermarket_purchase::SimulatedPaymentAdapter;
use enermarket_store::{Config, DbClient, MemoryStore, PgMarketStore, StoreKind};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "enermarket_api=debug,enermarket_purchase=debug,enermarket_offer=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Enermarket API on port {}", config.server.port);

    let store: Arc<dyn MarketStore> = match config.market.store {
        StoreKind::Postgres => {
            let db = DbClient::new(&config.database)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            Arc::new(PgMarketStore::new(db.pool.clone()))
        }
        StoreKind::Memory => {
            tracing::warn!("Using the in-memory store, nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let offset = config
        .market
        .utc_offset()
        .context("market.utc_offset_hours is out of range")?;
    let clock = Arc::new(SystemClock::new(offset));

    let (state, background) = AppState::assemble(store, clock, Arc::new(SimulatedPaymentAdapter), &config)
        .context("Failed to register metrics")?;

    let shutdown = CancellationToken::new();
    let workers = background.spawn(shutdown.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    shutdown.cancel();
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!("Background task failed: {}", e);
        }
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
