//! Entitlement persistence
//!
//! The store is the authoritative source. The query contract is deliberately
//! narrow: "the single most-recently-created active row" lives here, not in
//! the resolver, so callers cannot get the ordering wrong.

use async_trait::async_trait;
use ferropdv_shared::{ActivationMethod, PlanType};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::events::EntitlementEventType;
use crate::model::{EntitlementRecord, NewEntitlement};

/// Queryable table of entitlement rows.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// The most-recently-created row flagged active for this user, if any.
    /// Time-based expiry is NOT applied here; the resolver owns that check.
    async fn find_active_entitlement(
        &self,
        user_id: Uuid,
    ) -> BillingResult<Option<EntitlementRecord>>;

    /// Whether any trial row exists for this user, active or not.
    /// Trial usage is permanent; expiry never resets it.
    async fn has_trial_record(&self, user_id: Uuid) -> BillingResult<bool>;

    /// Insert a new row. Trial inserts are guarded by a partial unique index,
    /// so a concurrent duplicate surfaces as `TrialAlreadyUsed` instead of a
    /// second row. Payment inserts are deduplicated on the transaction id.
    async fn insert_entitlement(&self, new: NewEntitlement) -> BillingResult<EntitlementRecord>;

    /// Remove every row for a user (explicit admin deletion only).
    /// Returns the number of rows removed.
    async fn delete_entitlements(&self, user_id: Uuid, deleted_by: &str) -> BillingResult<u64>;
}

/// Postgres-backed store. Mutations also append to `entitlement_events`
/// inside the same transaction, so the audit trail cannot drift.
pub struct PostgresEntitlementStore {
    pool: PgPool,
}

impl PostgresEntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn event_for(method: ActivationMethod) -> EntitlementEventType {
        match method {
            ActivationMethod::Trial => EntitlementEventType::TrialActivated,
            ActivationMethod::Payment => EntitlementEventType::PaymentActivated,
            ActivationMethod::Admin => EntitlementEventType::AdminGranted,
        }
    }

    /// Map unique violations onto the business errors they enforce.
    fn map_insert_error(err: sqlx::Error, plan: PlanType) -> BillingError {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23505") {
                match db_err.constraint() {
                    Some("entitlements_one_trial_per_user") => {
                        return BillingError::TrialAlreadyUsed;
                    }
                    Some("entitlements_unique_payment_ref") => {
                        return BillingError::DuplicatePayment(plan.to_string());
                    }
                    _ => {}
                }
            }
        }
        BillingError::from(err)
    }
}

#[async_trait]
impl EntitlementStore for PostgresEntitlementStore {
    async fn find_active_entitlement(
        &self,
        user_id: Uuid,
    ) -> BillingResult<Option<EntitlementRecord>> {
        let record = sqlx::query_as::<_, EntitlementRecord>(
            r#"
            SELECT id, user_id, plan_type, is_active, activated_at, expires_at,
                   activated_by, activation_method, created_at
            FROM entitlements
            WHERE user_id = $1 AND is_active = true
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn has_trial_record(&self, user_id: Uuid) -> BillingResult<bool> {
        let exists: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM entitlements
                WHERE user_id = $1 AND plan_type = 'trial'
            )
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists.0)
    }

    async fn insert_entitlement(&self, new: NewEntitlement) -> BillingResult<EntitlementRecord> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, EntitlementRecord>(
            r#"
            INSERT INTO entitlements
                (user_id, plan_type, is_active, activated_at, expires_at,
                 activated_by, activation_method)
            VALUES ($1, $2, true, $3, $4, $5, $6)
            RETURNING id, user_id, plan_type, is_active, activated_at, expires_at,
                      activated_by, activation_method, created_at
            "#,
        )
        .bind(new.user_id)
        .bind(new.plan_type)
        .bind(new.activated_at)
        .bind(new.expires_at)
        .bind(&new.activated_by)
        .bind(new.activation_method)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| Self::map_insert_error(err, new.plan_type))?;

        sqlx::query(
            r#"
            INSERT INTO entitlement_events (user_id, event_type, plan_type, detail)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(new.user_id)
        .bind(Self::event_for(new.activation_method).to_string())
        .bind(new.plan_type.to_string())
        .bind(new.activated_by.as_deref())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn delete_entitlements(&self, user_id: Uuid, deleted_by: &str) -> BillingResult<u64> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM entitlements WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query(
            r#"
            INSERT INTO entitlement_events (user_id, event_type, plan_type, detail)
            VALUES ($1, $2, NULL, $3)
            "#,
        )
        .bind(user_id)
        .bind(EntitlementEventType::AdminDeleted.to_string())
        .bind(deleted_by)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(deleted)
    }
}
