//! Shared application state

use std::sync::Arc;

use ferropdv_billing::EntitlementService;
use sqlx::PgPool;

use crate::auth::JwtValidator;
use crate::config::Config;

/// State shared by every handler. Cheap to clone; everything heavy is behind
/// an `Arc` or already reference-counted (the pool).
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub jwt: Arc<JwtValidator>,
    pub entitlements: Arc<EntitlementService>,
}
