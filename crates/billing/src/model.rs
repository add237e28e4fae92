//! Entitlement data model

use ferropdv_shared::{ActivationMethod, PlanType};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

const MS_PER_DAY: i128 = 86_400_000;

/// One subscription row. Rows are append-only: renewal and admin grants insert
/// new rows, historical rows stay behind with `is_active` eventually false.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EntitlementRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_type: PlanType,
    /// Independent of time-based expiry: a row can be flagged active but
    /// already past `expires_at`, or flagged inactive while still unexpired.
    /// Both count as not entitled.
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub activated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    /// Who/what triggered the activation: an admin id, a PIX transaction id,
    /// or nothing for self-service trials.
    pub activated_by: Option<String>,
    pub activation_method: ActivationMethod,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl EntitlementRecord {
    /// True while the row is both flagged active and not past its expiry.
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        self.is_active && self.expires_at > now
    }
}

/// Insert payload for a new entitlement row.
#[derive(Debug, Clone)]
pub struct NewEntitlement {
    pub user_id: Uuid,
    pub plan_type: PlanType,
    pub activated_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub activated_by: Option<String>,
    pub activation_method: ActivationMethod,
}

impl NewEntitlement {
    /// A self-service trial starting now, running for the trial's nominal period.
    pub fn trial(user_id: Uuid, now: OffsetDateTime) -> Self {
        Self {
            user_id,
            plan_type: PlanType::Trial,
            activated_at: now,
            expires_at: now + time::Duration::days(PlanType::Trial.period_days()),
            activated_by: None,
            activation_method: ActivationMethod::Trial,
        }
    }
}

/// Which source decided the entitlement. Kept on the result for "why is this
/// account active?" debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementSource {
    /// Administrators bypass resolution entirely.
    AdminBypass,
    /// Authoritative row from the persistence service.
    Store,
    /// Admin-activated cache snapshot (degraded mode).
    AdminSnapshot,
    /// Legacy user-format cache snapshot (degraded mode).
    UserSnapshot,
    /// Legacy status cache snapshot (degraded mode).
    StatusSnapshot,
    /// No source yielded an active entitlement.
    None,
}

/// Resolved entitlement: the single answer the rest of the platform consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entitlement {
    pub active: bool,
    pub plan: Option<PlanType>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    pub remaining_days: Option<i64>,
    pub source: EntitlementSource,
}

impl Entitlement {
    pub fn inactive() -> Self {
        Self {
            active: false,
            plan: None,
            expires_at: None,
            remaining_days: None,
            source: EntitlementSource::None,
        }
    }

    pub fn admin_bypass() -> Self {
        Self {
            active: true,
            plan: None,
            expires_at: None,
            remaining_days: None,
            source: EntitlementSource::AdminBypass,
        }
    }

    pub fn active_from(
        plan: PlanType,
        expires_at: OffsetDateTime,
        source: EntitlementSource,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            active: true,
            plan: Some(plan),
            expires_at: Some(expires_at),
            remaining_days: Some(remaining_days(expires_at, now)),
            source,
        }
    }
}

/// Days remaining until expiry, rounded up, never negative.
///
/// A display derivative: 1ms left still shows as one day, anything in the past
/// shows as zero.
pub fn remaining_days(expires_at: OffsetDateTime, now: OffsetDateTime) -> i64 {
    let ms = (expires_at - now).whole_milliseconds();
    if ms <= 0 {
        return 0;
    }
    ((ms + MS_PER_DAY - 1) / MS_PER_DAY) as i64
}
