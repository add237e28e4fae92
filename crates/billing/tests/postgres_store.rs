//! Integration tests for the Postgres entitlement store
//!
//! These exercise the real unique indexes that back exactly-once trial
//! activation and payment dedup.
//!
//! ## Running Tests
//! ```bash
//! export DATABASE_URL="postgres://..."
//! cargo test -p ferropdv-billing -- --ignored
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Arc;

use ferropdv_billing::{
    BillingError, EntitlementService, EntitlementStore, MemorySnapshotCache, NewEntitlement,
    PostgresEntitlementStore,
};
use ferropdv_shared::PlanType;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

async fn setup() -> (EntitlementService, Arc<PostgresEntitlementStore>, PgPool) {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    ferropdv_shared::db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let store = Arc::new(PostgresEntitlementStore::new(pool.clone()));
    let cache = Arc::new(MemorySnapshotCache::new());
    let service = EntitlementService::new(store.clone(), cache);
    (service, store, pool)
}

#[tokio::test]
#[ignore] // Requires database
async fn test_trial_unique_index_backstops_races() {
    let (_service, store, _pool) = setup().await;
    let user_id = Uuid::new_v4();
    let now = OffsetDateTime::now_utc();

    // Two concurrent inserts, as a double-click or second tab would produce
    let (first, second) = tokio::join!(
        store.insert_entitlement(NewEntitlement::trial(user_id, now)),
        store.insert_entitlement(NewEntitlement::trial(user_id, now)),
    );

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one trial insert must win");

    let loser = if first.is_err() { first } else { second };
    assert!(matches!(loser, Err(BillingError::TrialAlreadyUsed)));
    assert!(store.has_trial_record(user_id).await.unwrap());
}

#[tokio::test]
#[ignore] // Requires database
async fn test_find_active_entitlement_picks_newest_row() {
    let (service, store, _pool) = setup().await;
    let user_id = Uuid::new_v4();

    service
        .activate_paid_plan(user_id, PlanType::Monthly, &format!("pix-{}", Uuid::new_v4()))
        .await
        .unwrap();
    let renewal = service
        .activate_paid_plan(user_id, PlanType::Quarterly, &format!("pix-{}", Uuid::new_v4()))
        .await
        .unwrap();

    let current = store
        .find_active_entitlement(user_id)
        .await
        .unwrap()
        .expect("active row expected");
    assert_eq!(current.id, renewal.id);
    assert_eq!(current.plan_type, PlanType::Quarterly);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_payment_ref_is_deduplicated() {
    let (service, _store, _pool) = setup().await;
    let user_id = Uuid::new_v4();
    let payment_ref = format!("pix-{}", Uuid::new_v4());

    service
        .activate_paid_plan(user_id, PlanType::Monthly, &payment_ref)
        .await
        .unwrap();
    assert!(matches!(
        service
            .activate_paid_plan(user_id, PlanType::Monthly, &payment_ref)
            .await,
        Err(BillingError::DuplicatePayment(_))
    ));
}

#[tokio::test]
#[ignore] // Requires database
async fn test_admin_delete_removes_rows_and_logs_event() {
    let (service, store, pool) = setup().await;
    let user_id = Uuid::new_v4();
    let admin_id = Uuid::new_v4();

    service
        .activate_paid_plan(user_id, PlanType::Annual, &format!("pix-{}", Uuid::new_v4()))
        .await
        .unwrap();

    let deleted = service.admin_revoke(user_id, admin_id).await.unwrap();
    assert_eq!(deleted, 1);
    assert!(store.find_active_entitlement(user_id).await.unwrap().is_none());

    let (events,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM entitlement_events WHERE user_id = $1 AND event_type = 'ADMIN_DELETED'",
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(events, 1);
}
