//! Webhook Queue Processor
//!
//! Processes PIX webhooks from the persistent queue with retry logic. The API
//! writes rows on receipt; this worker owns every side effect, so webhook
//! delivery and account crediting never race a deploy.

use anyhow::Context;
use ferropdv_billing::pix::{PixClient, PixWebhookEvent};
use ferropdv_billing::{BillingError, EntitlementService};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Process pending webhooks from the queue
pub async fn process_webhook_queue(pool: &PgPool, service: &EntitlementService, pix: &PixClient) {
    // Find webhooks to process (pending or failed with retries remaining)
    let webhooks: Vec<(Uuid, String, Value, i32, i32)> = match sqlx::query_as(
        r#"
        SELECT id, webhook_type, payload, attempts, max_attempts
        FROM webhook_processing_queue
        WHERE (status = 'pending' OR (status = 'failed' AND attempts < max_attempts))
          AND (last_attempt_at IS NULL OR last_attempt_at < NOW() - INTERVAL '5 minutes')
        ORDER BY created_at ASC
        LIMIT 10
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            error!(error = %e, "Failed to fetch webhooks from queue");
            return;
        }
    };

    if webhooks.is_empty() {
        return; // No work to do
    }

    info!(count = webhooks.len(), "Processing webhooks from queue");

    for (queue_id, webhook_type, payload, attempts, max_attempts) in webhooks {
        // Mark as processing
        if let Err(e) = sqlx::query(
            r#"
            UPDATE webhook_processing_queue
            SET status = 'processing', last_attempt_at = NOW(), attempts = attempts + 1
            WHERE id = $1
            "#,
        )
        .bind(queue_id)
        .execute(pool)
        .await
        {
            error!(queue_id = %queue_id, error = %e, "Failed to mark webhook as processing");
            continue;
        }

        // Process based on webhook type
        let result = match webhook_type.as_str() {
            "pix.payment" => process_pix_payment(service, pix, &payload).await,
            _ => {
                warn!(webhook_type = %webhook_type, "Unknown webhook type");
                Ok(()) // Don't retry unknown types
            }
        };

        // Update queue status based on result
        match result {
            Ok(_) => {
                if let Err(e) = sqlx::query(
                    "UPDATE webhook_processing_queue SET status = 'completed', processed_at = NOW() WHERE id = $1"
                )
                .bind(queue_id)
                .execute(pool)
                .await
                {
                    error!(queue_id = %queue_id, error = %e, "Failed to mark webhook as completed");
                }
                info!(queue_id = %queue_id, webhook_type = %webhook_type, "Webhook processed successfully");
            }
            Err(e) => {
                let error_msg = e.to_string();
                let new_attempts = attempts + 1;

                if let Err(e) = sqlx::query(
                    "UPDATE webhook_processing_queue SET status = 'failed', last_error = $1 WHERE id = $2"
                )
                .bind(&error_msg)
                .bind(queue_id)
                .execute(pool)
                .await
                {
                    error!(queue_id = %queue_id, error = %e, "Failed to mark webhook as failed");
                }

                if new_attempts >= max_attempts {
                    error!(
                        queue_id = %queue_id,
                        webhook_type = %webhook_type,
                        attempts = new_attempts,
                        error = %error_msg,
                        "Webhook permanently failed after max retries"
                    );
                } else {
                    warn!(
                        queue_id = %queue_id,
                        webhook_type = %webhook_type,
                        attempts = new_attempts,
                        max_attempts = max_attempts,
                        error = %error_msg,
                        "Webhook processing failed, will retry"
                    );
                }
            }
        }
    }
}

/// Process one PIX payment webhook: confirm the payment with the gateway,
/// then credit the account. A redelivered webhook is a no-op.
async fn process_pix_payment(
    service: &EntitlementService,
    pix: &PixClient,
    payload: &Value,
) -> anyhow::Result<()> {
    let event: PixWebhookEvent =
        serde_json::from_value(payload.clone()).context("invalid PIX webhook payload")?;

    if !event.is_payment_approved() {
        debug!(event = %event.event, "Ignoring non-approval PIX event");
        return Ok(());
    }

    // Never credit on the webhook alone; the gateway's read API is the truth.
    let status = pix.fetch_payment_status(&event.payment.id).await?;
    if !status.is_approved() {
        anyhow::bail!(
            "gateway reports payment {} as '{}', not approved",
            event.payment.id,
            status.status
        );
    }

    match service
        .activate_paid_plan(
            event.payment.user_id,
            event.payment.plan_type,
            &event.payment.id,
        )
        .await
    {
        Ok(record) => {
            info!(
                user_id = %event.payment.user_id,
                plan = %event.payment.plan_type,
                payment_id = %event.payment.id,
                expires_at = %record.expires_at,
                "Payment credited"
            );
            Ok(())
        }
        // Redelivery of an already-credited payment
        Err(BillingError::DuplicatePayment(_)) => {
            info!(payment_id = %event.payment.id, "Payment already credited, skipping");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Cleanup old completed/failed webhooks (for maintenance job)
pub async fn cleanup_old_webhooks(pool: &PgPool, older_than_days: i32) -> anyhow::Result<u64> {
    let deleted = sqlx::query(
        r#"
        DELETE FROM webhook_processing_queue
        WHERE status IN ('completed', 'failed')
          AND created_at < NOW() - make_interval(days => $1)
        "#,
    )
    .bind(older_than_days)
    .execute(pool)
    .await?
    .rows_affected();

    if deleted > 0 {
        info!(deleted, "Cleaned up old webhook queue rows");
    }
    Ok(deleted)
}
