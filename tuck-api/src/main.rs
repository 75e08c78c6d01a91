use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tuck_api::{app, AppState};
use tuck_core::RecordStore;
use tuck_dispatch::{Engine, EngineSettings};
use tuck_store::{Config, InMemoryRecordStore, RedisRecordStore, StoreBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tuck_api=debug,tuck_dispatch=debug,tuck_lifecycle=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Tuck engine on port {}", config.server.port);

    let store: Arc<dyn RecordStore> = match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory record store; nothing survives a restart");
            Arc::new(InMemoryRecordStore::new())
        }
        StoreBackend::Redis => Arc::new(
            RedisRecordStore::connect(config.redis_url()?)
                .await
                .context("Failed to connect to Redis")?,
        ),
    };

    let settings = EngineSettings { subscriber_buffer: config.engine.subscriber_buffer };
    let engine = Engine::new(store, settings).context("Failed to build engine metrics")?;
    let app = app(AppState::new(engine));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
