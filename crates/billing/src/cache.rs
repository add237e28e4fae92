//! Local snapshot cache
//!
//! Key-value storage for entitlement snapshots, keyed per user. The cache has
//! no TTL of its own; expiry is always computed by the resolver, which deletes
//! stale entries as it reads them (self-healing).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::BillingResult;

/// Cache key layout. Three snapshot shapes accumulated over the product's
/// lifetime, plus the permanent trial-used flag.
pub mod keys {
    use super::Uuid;

    /// Admin-activated snapshot (highest-priority fallback).
    pub fn admin_activation(user_id: Uuid) -> String {
        format!("ferropdv:admin_activation:{user_id}")
    }

    /// Legacy user-format snapshot.
    pub fn user_subscription(user_id: Uuid) -> String {
        format!("ferropdv:user_subscription:{user_id}")
    }

    /// Legacy status snapshot (lowest-priority fallback).
    pub fn subscription_status(user_id: Uuid) -> String {
        format!("ferropdv:subscription_status:{user_id}")
    }

    /// Permanent trial-used marker, consulted when the store is unreachable.
    pub fn trial_used(user_id: Uuid) -> String {
        format!("ferropdv:trial_used:{user_id}")
    }
}

/// Get/set/delete of JSON-serialized snapshots by string key.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    async fn get(&self, key: &str) -> BillingResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> BillingResult<()>;
    async fn delete(&self, key: &str) -> BillingResult<()>;
}

/// Redis-backed snapshot cache used in hosted deployments.
#[derive(Clone)]
pub struct RedisSnapshotCache {
    conn: redis::aio::ConnectionManager,
}

impl RedisSnapshotCache {
    pub async fn connect(redis_url: &str) -> BillingResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl SnapshotCache for RedisSnapshotCache {
    async fn get(&self, key: &str) -> BillingResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> BillingResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> BillingResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

/// In-memory snapshot cache for single-node deployments and tests.
#[derive(Default)]
pub struct MemorySnapshotCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries, for assertions in tests.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SnapshotCache for MemorySnapshotCache {
    async fn get(&self, key: &str) -> BillingResult<Option<String>> {
        Ok(self
            .entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: &str) -> BillingResult<()> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> BillingResult<()> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
        Ok(())
    }
}
