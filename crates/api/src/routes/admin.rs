//! Platform admin routes
//!
//! Manual entitlement grants and the explicit deletion path. These are the
//! only flows that remove entitlement rows.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use ferropdv_shared::PlanType;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::AdminUser;
use crate::error::ApiResult;
use crate::routes::subscription::ActivationResponse;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct GrantRequest {
    pub user_id: Uuid,
    pub plan_type: PlanType,
}

/// Grant an entitlement to any account.
pub async fn grant_entitlement(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(request): Json<GrantRequest>,
) -> ApiResult<(StatusCode, Json<ActivationResponse>)> {
    let record = state
        .entitlements
        .admin_grant(request.user_id, request.plan_type, admin.user_id)
        .await?;

    info!(
        admin_id = %admin.user_id,
        user_id = %request.user_id,
        plan = %request.plan_type,
        "admin granted entitlement"
    );
    Ok((StatusCode::CREATED, Json(ActivationResponse::from(record))))
}

#[derive(Serialize)]
pub struct RevokeResponse {
    pub deleted: u64,
}

/// Delete every entitlement row for an account.
pub async fn revoke_entitlements(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<RevokeResponse>> {
    let deleted = state
        .entitlements
        .admin_revoke(user_id, admin.user_id)
        .await?;

    info!(admin_id = %admin.user_id, %user_id, deleted, "admin deleted entitlements");
    Ok(Json(RevokeResponse { deleted }))
}
