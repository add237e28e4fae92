//! API routes

pub mod admin;
pub mod health;
pub mod subscription;
pub mod webhooks;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public API routes (webhook auth is the payload signature, not a JWT)
    let public_api_routes = Router::new().route("/webhooks/pix", post(webhooks::pix_webhook));

    // Account routes (auth handled by the AuthUser extractor)
    let mut account_routes = Router::new()
        .route("/subscription/status", get(subscription::get_status))
        .route(
            "/subscription/trial/eligibility",
            get(subscription::trial_eligibility),
        );

    // Trial activation can be switched off at runtime without a deploy
    if state.config.enable_trials {
        account_routes =
            account_routes.route("/subscription/trial", post(subscription::activate_trial));
    }

    // Platform admin routes (role check in the AdminUser extractor)
    let admin_routes = Router::new()
        .route("/admin/entitlements", post(admin::grant_entitlement))
        .route(
            "/admin/entitlements/:user_id",
            delete(admin::revoke_entitlements),
        );

    let api_v1_routes = Router::new()
        .merge(public_api_routes)
        .merge(account_routes)
        .merge(admin_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        // Webhook payloads are small; anything bigger is not ours
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state)
}
