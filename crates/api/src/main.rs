use std::sync::Arc;

use anyhow::Context;
use ferropdv_api::{routes, AppState, Config};
use ferropdv_billing::{
    EntitlementService, PostgresEntitlementStore, RedisSnapshotCache, SnapshotCache,
};
use ferropdv_shared::db;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    let pool = db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("failed to connect to database")?;
    info!("database connection established");

    db::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;

    let cache: Arc<dyn SnapshotCache> = Arc::new(
        RedisSnapshotCache::connect(&config.redis_url)
            .await
            .context("failed to connect to redis")?,
    );
    let store = Arc::new(PostgresEntitlementStore::new(pool.clone()));
    let entitlements = Arc::new(EntitlementService::new(store, cache));

    let jwt = Arc::new(ferropdv_api::auth::JwtValidator::new(
        &config.supabase_jwt_secret,
    ));

    let bind_address = config.bind_address.clone();
    let state = AppState {
        pool,
        config: Arc::new(config),
        jwt,
        entitlements,
    };

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!(addr = %bind_address, "FerroPDV API listening");

    axum::serve(listener, routes::create_router(state)).await?;
    Ok(())
}
