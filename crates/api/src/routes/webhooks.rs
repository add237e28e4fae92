//! Payment gateway webhook intake
//!
//! The API only verifies the signature and persists the event; all side
//! effects (double-checking with the gateway, crediting the account) happen in
//! the worker, so a redeployment or crash never loses an approved payment.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use ferropdv_billing::pix;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-pix-signature";

/// PIX gateway webhook endpoint. Signature is verified over the raw body.
pub async fn pix_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::WebhookSignatureInvalid)?;

    pix::verify_webhook_signature(&state.config.pix_webhook_secret, &body, signature).map_err(
        |err| {
            warn!(error = %err, "rejected PIX webhook");
            ApiError::from(err)
        },
    )?;

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("webhook body is not valid JSON".to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO webhook_processing_queue (webhook_type, payload)
        VALUES ('pix.payment', $1)
        "#,
    )
    .bind(&payload)
    .execute(&state.pool)
    .await?;

    info!("PIX webhook accepted and queued");
    Ok((StatusCode::OK, Json(json!({ "received": true }))))
}
