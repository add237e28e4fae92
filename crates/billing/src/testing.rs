//! In-memory store fake for unit tests.

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use ferropdv_shared::{ActivationMethod, PlanType};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::model::{EntitlementRecord, NewEntitlement};
use crate::store::EntitlementStore;

/// Vec-backed `EntitlementStore` with a switchable failure mode, mirroring the
/// business constraints the Postgres indexes enforce.
#[derive(Default)]
pub(crate) struct FakeStore {
    pub records: Mutex<Vec<EntitlementRecord>>,
    failing: AtomicBool,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<EntitlementRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every store call return a query failure until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    fn check_available(&self) -> BillingResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(BillingError::Database("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Build a record directly, bypassing activation flows.
pub(crate) fn record(
    user_id: Uuid,
    plan: PlanType,
    is_active: bool,
    expires_in: Duration,
    created_ago: Duration,
) -> EntitlementRecord {
    let now = OffsetDateTime::now_utc();
    EntitlementRecord {
        id: Uuid::new_v4(),
        user_id,
        plan_type: plan,
        is_active,
        activated_at: now - created_ago,
        expires_at: now + expires_in,
        activated_by: None,
        activation_method: match plan {
            PlanType::Trial => ActivationMethod::Trial,
            _ => ActivationMethod::Payment,
        },
        created_at: now - created_ago,
    }
}

#[async_trait]
impl EntitlementStore for FakeStore {
    async fn find_active_entitlement(
        &self,
        user_id: Uuid,
    ) -> BillingResult<Option<EntitlementRecord>> {
        self.check_available()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id && r.is_active)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn has_trial_record(&self, user_id: Uuid) -> BillingResult<bool> {
        self.check_available()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.user_id == user_id && r.plan_type == PlanType::Trial))
    }

    async fn insert_entitlement(&self, new: NewEntitlement) -> BillingResult<EntitlementRecord> {
        self.check_available()?;
        let mut records = self.records.lock().unwrap();

        // Partial unique index: one trial row per user, ever.
        if new.plan_type == PlanType::Trial
            && records
                .iter()
                .any(|r| r.user_id == new.user_id && r.plan_type == PlanType::Trial)
        {
            return Err(BillingError::TrialAlreadyUsed);
        }

        // Payment reference dedup.
        if new.activation_method == ActivationMethod::Payment
            && records.iter().any(|r| {
                r.activation_method == ActivationMethod::Payment
                    && r.activated_by == new.activated_by
            })
        {
            return Err(BillingError::DuplicatePayment(
                new.activated_by.clone().unwrap_or_default(),
            ));
        }

        let record = EntitlementRecord {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            plan_type: new.plan_type,
            is_active: true,
            activated_at: new.activated_at,
            expires_at: new.expires_at,
            activated_by: new.activated_by,
            activation_method: new.activation_method,
            created_at: OffsetDateTime::now_utc(),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn delete_entitlements(&self, user_id: Uuid, _deleted_by: &str) -> BillingResult<u64> {
        self.check_available()?;
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.user_id != user_id);
        Ok((before - records.len()) as u64)
    }
}
