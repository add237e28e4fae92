mod webhook_processor;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ferropdv_billing::pix::{PixClient, PixConfig};
use ferropdv_billing::{
    EntitlementService, PostgresEntitlementStore, RedisSnapshotCache, SnapshotCache,
};
use ferropdv_shared::db;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const WEBHOOK_RETENTION_DAYS: i32 = 7;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let redis_url = std::env::var("REDIS_URL")
        .unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let poll_secs: u64 = std::env::var("WORKER_POLL_INTERVAL_SECS")
        .unwrap_or_else(|_| "15".to_string())
        .parse()
        .unwrap_or(15);

    // The API instance owns migrations; the worker only needs a small pool.
    let pool = db::create_pool(&database_url, 2)
        .await
        .context("failed to connect to database")?;
    info!("database connection established");

    let cache: Arc<dyn SnapshotCache> = Arc::new(
        RedisSnapshotCache::connect(&redis_url)
            .await
            .context("failed to connect to redis")?,
    );
    let store = Arc::new(PostgresEntitlementStore::new(pool.clone()));
    let service = EntitlementService::new(store, cache);

    let pix = PixClient::new(PixConfig::from_env()?)?;

    info!(poll_secs, "FerroPDV worker started");

    let mut poll = tokio::time::interval(Duration::from_secs(poll_secs));
    let mut cleanup = tokio::time::interval(Duration::from_secs(3600));

    loop {
        tokio::select! {
            _ = poll.tick() => {
                webhook_processor::process_webhook_queue(&pool, &service, &pix).await;
            }
            _ = cleanup.tick() => {
                if let Err(err) =
                    webhook_processor::cleanup_old_webhooks(&pool, WEBHOOK_RETENTION_DAYS).await
                {
                    error!(error = %err, "webhook cleanup failed");
                }
            }
        }
    }
}
