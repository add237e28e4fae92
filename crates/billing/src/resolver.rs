//! Entitlement Resolver
//!
//! Answers "does this account currently have a paid or trial entitlement?"
//! with one deterministic source-priority pass:
//!
//! 1. administrators bypass everything,
//! 2. the persistence store is authoritative when reachable,
//! 3. three legacy cache snapshots serve as ordered fallbacks when it is not.
//!
//! Reads are self-healing: a snapshot found expired, inactive or unparsable is
//! deleted on the spot, and resolution continues with the next source. The
//! read path never surfaces errors; with every source exhausted the answer is
//! "not entitled" (fail-closed).

use std::sync::Arc;

use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::cache::{keys, SnapshotCache};
use crate::model::{Entitlement, EntitlementRecord, EntitlementSource};
use crate::snapshots::{self, AdminActivatedSnapshot, StatusSnapshot, UserFormatSnapshot};
use crate::store::EntitlementStore;

/// Entitlement service: resolution plus the activation operations in
/// `activation.rs`. Store and cache are injected so tests can substitute
/// in-memory implementations.
pub struct EntitlementService {
    pub(crate) store: Arc<dyn EntitlementStore>,
    pub(crate) cache: Arc<dyn SnapshotCache>,
}

impl EntitlementService {
    pub fn new(store: Arc<dyn EntitlementStore>, cache: Arc<dyn SnapshotCache>) -> Self {
        Self { store, cache }
    }

    /// Resolve the current entitlement for a user.
    ///
    /// Priority order, first match wins. A higher-priority source that turns
    /// out expired never short-circuits to "inactive": its cache entry is
    /// deleted and the next source is consulted.
    pub async fn resolve(&self, user_id: Uuid, is_admin: bool) -> Entitlement {
        let now = OffsetDateTime::now_utc();

        // 1. Administrators are always entitled, regardless of any state.
        if is_admin {
            debug!(%user_id, "admin bypass, skipping entitlement resolution");
            return Entitlement::admin_bypass();
        }

        // 2. Authoritative store row.
        match self.store.find_active_entitlement(user_id).await {
            Ok(Some(record)) if record.is_valid_at(now) => {
                self.write_through(&record).await;
                return Entitlement::active_from(
                    record.plan_type,
                    record.expires_at,
                    EntitlementSource::Store,
                    now,
                );
            }
            // No active row, or a row flagged active but already expired:
            // fall through to the cached snapshots.
            Ok(_) => {}
            Err(err) => {
                warn!(
                    %user_id,
                    error = %err,
                    "entitlement store unavailable, falling back to cached snapshots"
                );
            }
        }

        // 3. Admin-activated snapshot.
        let key = keys::admin_activation(user_id);
        if let Some(snapshot) = self.read_snapshot::<AdminActivatedSnapshot>(&key).await {
            if snapshot.is_currently_active(now) {
                return snapshot.to_entitlement(now);
            }
            self.discard(&key).await;
        }

        // 4. Legacy user-format snapshot.
        let key = keys::user_subscription(user_id);
        if let Some(snapshot) = self.read_snapshot::<UserFormatSnapshot>(&key).await {
            if snapshot.is_currently_active(now) {
                return snapshot.to_entitlement(now);
            }
            self.discard(&key).await;
        }

        // 5. Legacy status snapshot.
        let key = keys::subscription_status(user_id);
        if let Some(snapshot) = self.read_snapshot::<StatusSnapshot>(&key).await {
            if snapshot.is_currently_active(now) {
                return snapshot.to_entitlement(now);
            }
            self.discard(&key).await;
        }

        // 6. Every source exhausted.
        Entitlement::inactive()
    }

    /// Cache round trip used by health checks.
    pub async fn cache_healthy(&self, probe_key: &str) -> bool {
        self.cache.set(probe_key, "ok").await.is_ok()
            && matches!(self.cache.get(probe_key).await, Ok(Some(value)) if value == "ok")
    }

    /// Rewrite all three snapshot shapes from an authoritative row.
    /// Cache failures are logged, never propagated: the caller already has
    /// the answer.
    pub(crate) async fn write_through(&self, record: &EntitlementRecord) {
        let pairs = match snapshots::projections(record) {
            Ok(pairs) => pairs,
            Err(err) => {
                error!(user_id = %record.user_id, error = %err, "snapshot projection failed");
                return;
            }
        };

        for (key, json) in pairs {
            if let Err(err) = self.cache.set(&key, &json).await {
                warn!(%key, error = %err, "snapshot write-through failed");
            }
        }
    }

    /// Read and parse one snapshot. A malformed entry is treated as absent:
    /// deleted immediately, `None` returned, resolution continues.
    async fn read_snapshot<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.cache.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(%key, error = %err, "snapshot read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(%key, error = %err, "malformed snapshot, discarding");
                self.discard(key).await;
                None
            }
        }
    }

    /// Delete a stale cache entry; failure only costs a retry on the next read.
    pub(crate) async fn discard(&self, key: &str) {
        if let Err(err) = self.cache.delete(key).await {
            debug!(%key, error = %err, "snapshot delete failed");
        }
    }
}
