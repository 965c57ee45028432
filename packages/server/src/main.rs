use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use server::config::AppConfig;
use server::services::cache::LruResourceCache;
use server::services::quota::StaticQuota;
use server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = server::database::init_db(&config.database.url)
        .await
        .context("Failed to initialize database")?;

    let storage = common::storage::build_storage(&config.storage)
        .await
        .context("Failed to initialize storage backend")?;
    info!(provider = %storage.provider(), "Storage backend ready");

    let cache = Arc::new(LruResourceCache::new(config.cache.capacity));
    let quota = Arc::new(StaticQuota::new(
        config.quota.default_capacity,
        config.quota.owner_overrides(),
    ));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, db, storage, cache, quota);
    let app = server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server running at http://{}", addr);
    info!("Swagger UI at http://{}/swagger-ui", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
