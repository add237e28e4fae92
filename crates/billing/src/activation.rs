//! Trial, payment and admin activation paths
//!
//! All three create new entitlement rows; nothing here updates one in place.
//! Renewal semantics are append-only, matching the store's query contract
//! ("most recent active row wins").

use ferropdv_shared::{ActivationMethod, PlanType};
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::keys;
use crate::error::{BillingError, BillingResult};
use crate::model::{EntitlementRecord, NewEntitlement};
use crate::resolver::EntitlementService;

impl EntitlementService {
    /// Whether this user has ever activated a trial, expired or not.
    ///
    /// When the store is unreachable the permanent local flag decides; with
    /// the flag also absent the answer defaults to "not used" (permissive).
    pub async fn has_used_trial(&self, user_id: Uuid) -> bool {
        match self.store.has_trial_record(user_id).await {
            Ok(used) => {
                if used {
                    // Self-heal the local flag so degraded mode stays accurate.
                    self.mark_trial_used(user_id).await;
                }
                used
            }
            Err(err) => {
                warn!(%user_id, error = %err, "trial lookup failed, using local flag");
                matches!(
                    self.cache.get(&keys::trial_used(user_id)).await,
                    Ok(Some(flag)) if flag == "true"
                )
            }
        }
    }

    /// Activate the one-time free trial.
    ///
    /// The pre-checks shape the error the caller sees; exactly-once under
    /// concurrent calls is enforced by the store's partial unique index.
    pub async fn activate_trial(&self, user_id: Uuid) -> BillingResult<EntitlementRecord> {
        if self.has_used_trial(user_id).await {
            return Err(BillingError::TrialAlreadyUsed);
        }
        if self.resolve(user_id, false).await.active {
            return Err(BillingError::AlreadyActive);
        }

        let now = OffsetDateTime::now_utc();
        let record = self
            .store
            .insert_entitlement(NewEntitlement::trial(user_id, now))
            .await?;

        self.write_through(&record).await;
        self.mark_trial_used(user_id).await;
        info!(%user_id, expires_at = %record.expires_at, "trial activated");
        Ok(record)
    }

    /// Create a paid entitlement after the gateway approves a PIX payment.
    ///
    /// Paying while still active is a renewal: the new period stacks onto the
    /// current expiry instead of starting from now. `payment_ref` is the
    /// gateway transaction id and deduplicates redelivered webhooks.
    pub async fn activate_paid_plan(
        &self,
        user_id: Uuid,
        plan: PlanType,
        payment_ref: &str,
    ) -> BillingResult<EntitlementRecord> {
        if plan == PlanType::Trial {
            return Err(BillingError::InvalidPlan(
                "trial plans cannot be purchased".to_string(),
            ));
        }

        let now = OffsetDateTime::now_utc();
        let base = match self.store.find_active_entitlement(user_id).await? {
            Some(current) if current.is_valid_at(now) => current.expires_at,
            _ => now,
        };

        let record = self
            .store
            .insert_entitlement(NewEntitlement {
                user_id,
                plan_type: plan,
                activated_at: now,
                expires_at: base + Duration::days(plan.period_days()),
                activated_by: Some(payment_ref.to_string()),
                activation_method: ActivationMethod::Payment,
            })
            .await?;

        self.write_through(&record).await;
        info!(
            %user_id,
            plan = %plan,
            payment_ref,
            expires_at = %record.expires_at,
            "paid plan activated"
        );
        Ok(record)
    }

    /// Manual grant by a platform administrator.
    pub async fn admin_grant(
        &self,
        user_id: Uuid,
        plan: PlanType,
        admin_id: Uuid,
    ) -> BillingResult<EntitlementRecord> {
        let now = OffsetDateTime::now_utc();
        let record = self
            .store
            .insert_entitlement(NewEntitlement {
                user_id,
                plan_type: plan,
                activated_at: now,
                expires_at: now + Duration::days(plan.period_days()),
                activated_by: Some(format!("admin:{admin_id}")),
                activation_method: ActivationMethod::Admin,
            })
            .await?;

        self.write_through(&record).await;
        info!(%user_id, plan = %plan, %admin_id, "entitlement granted by admin");
        Ok(record)
    }

    /// Explicit admin deletion: removes every row and every cached snapshot.
    /// The trial-used flag stays; trial usage survives row deletion.
    pub async fn admin_revoke(&self, user_id: Uuid, admin_id: Uuid) -> BillingResult<u64> {
        let deleted = self
            .store
            .delete_entitlements(user_id, &format!("admin:{admin_id}"))
            .await?;

        self.discard(&keys::admin_activation(user_id)).await;
        self.discard(&keys::user_subscription(user_id)).await;
        self.discard(&keys::subscription_status(user_id)).await;

        info!(%user_id, %admin_id, deleted, "entitlements deleted by admin");
        Ok(deleted)
    }

    /// Set the permanent local trial flag; failure is logged and retried on
    /// the next successful store read.
    async fn mark_trial_used(&self, user_id: Uuid) {
        if let Err(err) = self.cache.set(&keys::trial_used(user_id), "true").await {
            warn!(%user_id, error = %err, "failed to persist local trial flag");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemorySnapshotCache, SnapshotCache};
    use crate::snapshots::AdminActivatedSnapshot;
    use crate::testing::{record, FakeStore};
    use std::sync::Arc;

    fn service(store: FakeStore) -> (EntitlementService, Arc<FakeStore>, Arc<MemorySnapshotCache>) {
        let store = Arc::new(store);
        let cache = Arc::new(MemorySnapshotCache::new());
        let service = EntitlementService::new(store.clone(), cache.clone());
        (service, store, cache)
    }

    #[tokio::test]
    async fn test_trial_activation_happy_path() {
        let (service, store, cache) = service(FakeStore::new());
        let user_id = Uuid::new_v4();

        let trial = service.activate_trial(user_id).await.unwrap();
        assert_eq!(trial.plan_type, PlanType::Trial);
        assert_eq!(trial.activation_method, ActivationMethod::Trial);
        assert_eq!(store.record_count(), 1);

        // Write-through plus the permanent flag
        assert_eq!(
            cache.get(&keys::trial_used(user_id)).await.unwrap().as_deref(),
            Some("true")
        );
        let resolved = service.resolve(user_id, false).await;
        assert!(resolved.active);
        assert_eq!(resolved.plan, Some(PlanType::Trial));
        assert_eq!(resolved.remaining_days, Some(7));
    }

    #[tokio::test]
    async fn test_trial_is_exactly_once() {
        let (service, store, _cache) = service(FakeStore::new());
        let user_id = Uuid::new_v4();

        service.activate_trial(user_id).await.unwrap();
        assert!(matches!(
            service.activate_trial(user_id).await,
            Err(BillingError::TrialAlreadyUsed)
        ));

        // Still used after the first record is flagged inactive
        store
            .records
            .lock()
            .unwrap()
            .iter_mut()
            .for_each(|r| r.is_active = false);
        assert!(matches!(
            service.activate_trial(user_id).await,
            Err(BillingError::TrialAlreadyUsed)
        ));
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn test_store_constraint_backstops_concurrent_trials() {
        // Two racing activations both pass the pre-checks; the insert path
        // must still reject the second one.
        let (service, _store, _cache) = service(FakeStore::new());
        let user_id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        service
            .store
            .insert_entitlement(NewEntitlement::trial(user_id, now))
            .await
            .unwrap();
        assert!(matches!(
            service
                .store
                .insert_entitlement(NewEntitlement::trial(user_id, now))
                .await,
            Err(BillingError::TrialAlreadyUsed)
        ));
    }

    #[tokio::test]
    async fn test_trial_rejected_while_subscription_active() {
        let user_id = Uuid::new_v4();
        let (service, _store, _cache) = service(FakeStore::with_records(vec![record(
            user_id,
            PlanType::Monthly,
            true,
            Duration::days(10),
            Duration::days(20),
        )]));

        assert!(matches!(
            service.activate_trial(user_id).await,
            Err(BillingError::AlreadyActive)
        ));
    }

    #[tokio::test]
    async fn test_trial_rejected_from_cached_entitlement_when_store_down() {
        let (service, store, cache) = service(FakeStore::new());
        let user_id = Uuid::new_v4();

        // Degraded mode: the resolver finds an active snapshot even though the
        // store is unreachable, so activation must refuse.
        store.set_failing(true);
        let snapshot = AdminActivatedSnapshot {
            is_active: true,
            expires_at: OffsetDateTime::now_utc() + Duration::days(3),
            plan_type: PlanType::Monthly,
            activated_at: OffsetDateTime::now_utc() - Duration::days(27),
            activation_method: ActivationMethod::Admin,
            period_days: 30,
        };
        cache
            .set(
                &keys::admin_activation(user_id),
                &serde_json::to_string(&snapshot).unwrap(),
            )
            .await
            .unwrap();

        assert!(matches!(
            service.activate_trial(user_id).await,
            Err(BillingError::AlreadyActive)
        ));
    }

    #[tokio::test]
    async fn test_has_used_trial_permissive_fallback() {
        let (service, store, cache) = service(FakeStore::new());
        let user_id = Uuid::new_v4();

        store.set_failing(true);
        // Store down, no local flag: assume unused
        assert!(!service.has_used_trial(user_id).await);

        // Store down, flag present: used
        cache.set(&keys::trial_used(user_id), "true").await.unwrap();
        assert!(service.has_used_trial(user_id).await);
    }

    #[tokio::test]
    async fn test_has_used_trial_self_heals_local_flag() {
        let user_id = Uuid::new_v4();
        let (service, store, cache) = service(FakeStore::with_records(vec![record(
            user_id,
            PlanType::Trial,
            false,
            Duration::days(-30),
            Duration::days(37),
        )]));

        assert!(service.has_used_trial(user_id).await);
        assert_eq!(
            cache.get(&keys::trial_used(user_id)).await.unwrap().as_deref(),
            Some("true")
        );

        // From now on the answer survives a store outage
        store.set_failing(true);
        assert!(service.has_used_trial(user_id).await);
    }

    #[tokio::test]
    async fn test_paid_activation_rejects_trial_plan() {
        let (service, _store, _cache) = service(FakeStore::new());
        assert!(matches!(
            service
                .activate_paid_plan(Uuid::new_v4(), PlanType::Trial, "pix-1")
                .await,
            Err(BillingError::InvalidPlan(_))
        ));
    }

    #[tokio::test]
    async fn test_paid_activation_and_renewal_stacking() {
        let (service, _store, _cache) = service(FakeStore::new());
        let user_id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let first = service
            .activate_paid_plan(user_id, PlanType::Monthly, "pix-1001")
            .await
            .unwrap();
        let first_days = (first.expires_at - now).whole_days();
        assert!((29..=30).contains(&first_days));

        // Renewal stacks onto the remaining period
        let second = service
            .activate_paid_plan(user_id, PlanType::Monthly, "pix-1002")
            .await
            .unwrap();
        let second_days = (second.expires_at - now).whole_days();
        assert!((59..=60).contains(&second_days));

        let resolved = service.resolve(user_id, false).await;
        assert_eq!(resolved.plan, Some(PlanType::Monthly));
        assert_eq!(resolved.expires_at, Some(second.expires_at));
    }

    #[tokio::test]
    async fn test_paid_activation_deduplicates_payment_ref() {
        let (service, store, _cache) = service(FakeStore::new());
        let user_id = Uuid::new_v4();

        service
            .activate_paid_plan(user_id, PlanType::Quarterly, "pix-777")
            .await
            .unwrap();
        assert!(matches!(
            service
                .activate_paid_plan(user_id, PlanType::Quarterly, "pix-777")
                .await,
            Err(BillingError::DuplicatePayment(_))
        ));
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn test_paid_activation_surfaces_store_failure() {
        let (service, store, _cache) = service(FakeStore::new());
        store.set_failing(true);

        // Write path: failures are surfaced, not swallowed
        assert!(matches!(
            service
                .activate_paid_plan(Uuid::new_v4(), PlanType::Monthly, "pix-1")
                .await,
            Err(BillingError::Database(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_grant_stamps_method_and_actor() {
        let (service, _store, cache) = service(FakeStore::new());
        let user_id = Uuid::new_v4();
        let admin_id = Uuid::new_v4();

        let granted = service
            .admin_grant(user_id, PlanType::Annual, admin_id)
            .await
            .unwrap();
        assert_eq!(granted.activation_method, ActivationMethod::Admin);
        assert_eq!(granted.activated_by, Some(format!("admin:{admin_id}")));

        let admin_raw = cache
            .get(&keys::admin_activation(user_id))
            .await
            .unwrap()
            .unwrap();
        let snapshot: AdminActivatedSnapshot = serde_json::from_str(&admin_raw).unwrap();
        assert_eq!(snapshot.activation_method, ActivationMethod::Admin);
        assert_eq!(snapshot.period_days, 365);
    }

    #[tokio::test]
    async fn test_admin_revoke_clears_rows_and_snapshots_keeps_trial_flag() {
        let (service, store, cache) = service(FakeStore::new());
        let user_id = Uuid::new_v4();

        service.activate_trial(user_id).await.unwrap();
        service
            .activate_paid_plan(user_id, PlanType::Monthly, "pix-5")
            .await
            .unwrap();

        let deleted = service.admin_revoke(user_id, Uuid::new_v4()).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.record_count(), 0);

        assert!(!service.resolve(user_id, false).await.active);
        // Trial usage is permanent even after explicit deletion
        assert_eq!(
            cache.get(&keys::trial_used(user_id)).await.unwrap().as_deref(),
            Some("true")
        );
    }
}
