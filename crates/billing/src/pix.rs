//! PIX gateway integration
//!
//! The gateway's own protocol is not modeled here; the platform only consumes
//! its signed `payment.approved` webhook and re-checks a payment's status
//! before crediting an account. Webhook payloads are signed with HMAC-SHA256
//! over the raw body, hex-encoded in the `x-pix-signature` header.

use ferropdv_shared::PlanType;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

type HmacSha256 = Hmac<Sha256>;

/// Gateway confirmations must answer within this window; a timeout counts as
/// a query failure and the webhook is retried by the queue.
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// PIX gateway configuration
#[derive(Debug, Clone)]
pub struct PixConfig {
    /// Gateway REST base URL
    pub api_base_url: String,
    /// Bearer token for status lookups
    pub api_token: String,
    /// Webhook signing secret
    pub webhook_secret: String,
}

impl PixConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            api_base_url: std::env::var("PIX_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.pix-gateway.com.br".to_string()),
            api_token: std::env::var("PIX_API_TOKEN")
                .map_err(|_| BillingError::Config("PIX_API_TOKEN not set".to_string()))?,
            webhook_secret: std::env::var("PIX_WEBHOOK_SECRET")
                .map_err(|_| BillingError::Config("PIX_WEBHOOK_SECRET not set".to_string()))?,
        })
    }
}

/// Verify the gateway's HMAC-SHA256 signature over a raw webhook body.
pub fn verify_webhook_signature(
    secret: &str,
    payload: &[u8],
    signature_hex: &str,
) -> BillingResult<()> {
    let signature =
        hex::decode(signature_hex).map_err(|_| BillingError::WebhookSignatureInvalid)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::WebhookSignatureInvalid)?;
    mac.update(payload);
    mac.verify_slice(&signature)
        .map_err(|_| BillingError::WebhookSignatureInvalid)
}

/// Webhook envelope posted by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixWebhookEvent {
    /// Event name, e.g. "payment.approved"
    pub event: String,
    pub payment: PixPayment,
}

impl PixWebhookEvent {
    pub fn is_payment_approved(&self) -> bool {
        self.event == "payment.approved"
    }
}

/// Payment object inside a webhook event. `user_id` and `plan_type` travel in
/// the charge's external reference, set at checkout time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixPayment {
    pub id: String,
    pub status: String,
    pub user_id: Uuid,
    pub plan_type: PlanType,
    pub amount_cents: i64,
}

/// Status payload returned by the gateway's payment lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct PixPaymentStatus {
    pub id: String,
    pub status: String,
}

impl PixPaymentStatus {
    pub fn is_approved(&self) -> bool {
        self.status == "approved"
    }
}

/// Thin client for the gateway's read API.
pub struct PixClient {
    http: reqwest::Client,
    config: PixConfig,
}

impl PixClient {
    pub fn new(config: PixConfig) -> BillingResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(GATEWAY_TIMEOUT)
            .build()
            .map_err(|err| BillingError::Gateway(err.to_string()))?;
        Ok(Self { http, config })
    }

    /// Look up a payment's current status, retrying transient failures.
    /// Webhooks can arrive before the gateway's read replicas converge.
    pub async fn fetch_payment_status(&self, payment_id: &str) -> BillingResult<PixPaymentStatus> {
        let url = format!("{}/v1/payments/{}", self.config.api_base_url, payment_id);
        let strategy = ExponentialBackoff::from_millis(250).map(jitter).take(3);

        Retry::spawn(strategy, || async {
            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.config.api_token)
                .send()
                .await?;

            if !response.status().is_success() {
                warn!(payment_id, status = %response.status(), "gateway status lookup failed");
                return Err(BillingError::Gateway(format!(
                    "payment lookup returned {}",
                    response.status()
                )));
            }

            Ok(response.json::<PixPaymentStatus>().await?)
        })
        .await
    }
}
