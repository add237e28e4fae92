//! Legacy cache snapshot shapes
//!
//! Three lossy projections of the same entitlement row accumulated over the
//! product's lifetime. All three are rewritten together whenever the
//! authoritative row is fetched (write-through), and individually deleted when
//! read back expired, inactive or unparsable. Field casings are wire-frozen:
//! existing caches in the field still hold entries written by old clients.

use ferropdv_shared::{ActivationMethod, PlanType};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::cache::keys;
use crate::model::{Entitlement, EntitlementRecord, EntitlementSource};

/// Shape 1: written by the admin panel. snake_case keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminActivatedSnapshot {
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub plan_type: PlanType,
    #[serde(with = "time::serde::rfc3339")]
    pub activated_at: OffsetDateTime,
    pub activation_method: ActivationMethod,
    pub period_days: i64,
}

impl AdminActivatedSnapshot {
    pub fn is_currently_active(&self, now: OffsetDateTime) -> bool {
        self.is_active && self.expires_at > now
    }

    pub fn to_entitlement(&self, now: OffsetDateTime) -> Entitlement {
        Entitlement::active_from(
            self.plan_type,
            self.expires_at,
            EntitlementSource::AdminSnapshot,
            now,
        )
    }
}

/// Shape 2: written by the original account page. camelCase keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFormatSnapshot {
    pub has_active_subscription: bool,
    pub subscription_type: PlanType,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub is_trial_used: bool,
    pub activated_by: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub activated_at: OffsetDateTime,
    pub period_days: i64,
}

impl UserFormatSnapshot {
    pub fn is_currently_active(&self, now: OffsetDateTime) -> bool {
        self.has_active_subscription && self.expires_at > now
    }

    pub fn to_entitlement(&self, now: OffsetDateTime) -> Entitlement {
        Entitlement::active_from(
            self.subscription_type,
            self.expires_at,
            EntitlementSource::UserSnapshot,
            now,
        )
    }
}

/// Shape 3: the oldest one, written by the first release's status banner.
/// camelCase keys, `type` for the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub is_active: bool,
    #[serde(rename = "type")]
    pub plan_type: PlanType,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub period_days: i64,
}

impl StatusSnapshot {
    pub fn is_currently_active(&self, now: OffsetDateTime) -> bool {
        self.is_active && self.expires_at > now
    }

    pub fn to_entitlement(&self, now: OffsetDateTime) -> Entitlement {
        Entitlement::active_from(
            self.plan_type,
            self.expires_at,
            EntitlementSource::StatusSnapshot,
            now,
        )
    }
}

/// Project an authoritative row into all three cached shapes, paired with
/// their cache keys. Used for write-through after a successful store fetch.
pub fn projections(
    record: &EntitlementRecord,
) -> Result<Vec<(String, String)>, serde_json::Error> {
    let admin = AdminActivatedSnapshot {
        is_active: record.is_active,
        expires_at: record.expires_at,
        plan_type: record.plan_type,
        activated_at: record.activated_at,
        activation_method: record.activation_method,
        period_days: record.plan_type.period_days(),
    };
    let user = UserFormatSnapshot {
        has_active_subscription: record.is_active,
        subscription_type: record.plan_type,
        expires_at: record.expires_at,
        is_trial_used: record.plan_type == PlanType::Trial,
        activated_by: record.activated_by.clone(),
        activated_at: record.activated_at,
        period_days: record.plan_type.period_days(),
    };
    let status = StatusSnapshot {
        is_active: record.is_active,
        plan_type: record.plan_type,
        expires_at: record.expires_at,
        period_days: record.plan_type.period_days(),
    };

    Ok(vec![
        (
            keys::admin_activation(record.user_id),
            serde_json::to_string(&admin)?,
        ),
        (
            keys::user_subscription(record.user_id),
            serde_json::to_string(&user)?,
        ),
        (
            keys::subscription_status(record.user_id),
            serde_json::to_string(&status)?,
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use uuid::Uuid;

    fn sample_record(now: OffsetDateTime) -> EntitlementRecord {
        EntitlementRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan_type: PlanType::Monthly,
            is_active: true,
            activated_at: now,
            expires_at: now + Duration::days(30),
            activated_by: Some("pix-8831".to_string()),
            activation_method: ActivationMethod::Payment,
            created_at: now,
        }
    }

    #[test]
    fn test_user_shape_keeps_camel_case_keys() {
        let now = OffsetDateTime::now_utc();
        let record = sample_record(now);
        let pairs = projections(&record).unwrap();
        let (_, user_json) = &pairs[1];

        assert!(user_json.contains("\"hasActiveSubscription\":true"));
        assert!(user_json.contains("\"subscriptionType\":\"monthly\""));
        assert!(user_json.contains("\"isTrialUsed\":false"));
        assert!(user_json.contains("\"periodDays\":30"));
    }

    #[test]
    fn test_status_shape_uses_type_key() {
        let now = OffsetDateTime::now_utc();
        let record = sample_record(now);
        let pairs = projections(&record).unwrap();
        let (_, status_json) = &pairs[2];

        assert!(status_json.contains("\"type\":\"monthly\""));
        assert!(status_json.contains("\"isActive\":true"));
    }

    #[test]
    fn test_admin_shape_round_trips() {
        let now = OffsetDateTime::now_utc();
        let record = sample_record(now);
        let pairs = projections(&record).unwrap();
        let (_, admin_json) = &pairs[0];

        let parsed: AdminActivatedSnapshot = serde_json::from_str(admin_json).unwrap();
        assert!(parsed.is_currently_active(now));
        assert_eq!(parsed.plan_type, PlanType::Monthly);
        assert_eq!(parsed.activation_method, ActivationMethod::Payment);
    }

    #[test]
    fn test_snapshot_expiry_check() {
        let now = OffsetDateTime::now_utc();
        let snapshot = StatusSnapshot {
            is_active: true,
            plan_type: PlanType::Trial,
            expires_at: now - Duration::days(1),
            period_days: 7,
        };
        assert!(!snapshot.is_currently_active(now));
    }
}
