//! Subscription status and trial routes

use axum::{extract::State, http::StatusCode, Json};
use ferropdv_billing::{Entitlement, EntitlementRecord};
use ferropdv_shared::PlanType;
use serde::Serialize;
use time::OffsetDateTime;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Serialize)]
pub struct StatusResponse {
    pub active: bool,
    pub plan: Option<PlanType>,
    pub plan_name: Option<&'static str>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    pub remaining_days: Option<i64>,
}

impl From<Entitlement> for StatusResponse {
    fn from(entitlement: Entitlement) -> Self {
        Self {
            active: entitlement.active,
            plan: entitlement.plan,
            plan_name: entitlement.plan.map(|plan| plan.display_name()),
            expires_at: entitlement.expires_at,
            remaining_days: entitlement.remaining_days,
        }
    }
}

/// Current entitlement for the calling account.
pub async fn get_status(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Json<StatusResponse> {
    let entitlement = state
        .entitlements
        .resolve(auth.user_id, auth.is_admin)
        .await;
    Json(StatusResponse::from(entitlement))
}

#[derive(Serialize)]
pub struct TrialEligibilityResponse {
    pub trial_used: bool,
    pub trial_available: bool,
}

/// Whether the calling account can still start the one-time trial.
pub async fn trial_eligibility(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Json<TrialEligibilityResponse> {
    let trial_used = state.entitlements.has_used_trial(auth.user_id).await;
    Json(TrialEligibilityResponse {
        trial_used,
        trial_available: state.config.enable_trials && !trial_used,
    })
}

#[derive(Serialize)]
pub struct ActivationResponse {
    pub plan: PlanType,
    pub plan_name: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub remaining_days: i64,
}

impl From<EntitlementRecord> for ActivationResponse {
    fn from(record: EntitlementRecord) -> Self {
        Self {
            plan: record.plan_type,
            plan_name: record.plan_type.display_name(),
            remaining_days: ferropdv_billing::remaining_days(
                record.expires_at,
                OffsetDateTime::now_utc(),
            ),
            expires_at: record.expires_at,
        }
    }
}

/// Activate the one-time free trial for the calling account.
pub async fn activate_trial(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<(StatusCode, Json<ActivationResponse>)> {
    let record = state.entitlements.activate_trial(auth.user_id).await?;
    Ok((StatusCode::CREATED, Json(ActivationResponse::from(record))))
}
