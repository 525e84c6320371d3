pub mod admin;
pub mod auth;
pub mod payments;
pub mod system;
pub mod topup;
pub mod user;

use axum::{
    Router,
    routing::{delete, get, patch, post},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        // User endpoints
        .route("/api/v1/user/{npub}", get(user::get_user))
        .route("/api/v1/user/{npub}/balance", get(user::get_balance))
        .route("/api/v1/user/{npub}/can-spend", get(user::can_spend))
        .route("/api/v1/user/{npub}/spend", post(user::spend))
        .route("/api/v1/user/{npub}/transactions", get(user::get_transactions))
        .route("/api/v1/user/{npub}/topup", post(topup::create_user_topup))
        // Top-ups
        .route("/api/v1/topup", post(topup::create_topup))
        .route("/api/v1/topup/{payment_hash}", get(topup::get_topup))
        .route("/api/v1/payments/webhook", post(payments::payment_webhook))
        // Admin endpoints
        .route("/api/v1/users", get(admin::list_users))
        .route("/api/v1/transactions/recent", get(admin::recent_transactions))
        .route("/api/v1/stats", get(admin::stats))
        .route("/api/v1/admin/add-credits", post(admin::add_credits))
        .route("/api/v1/admin/user/{npub}", delete(admin::delete_user))
        .route("/api/v1/admin/user/{npub}/stats", patch(admin::update_user_stats))
        // System
        .route("/api/v1/health", get(system::health))
        .route("/api/v1/system/status", get(system::get_status))
        .route("/api/v1/admin/system/status", post(system::set_status))
        .route("/api/v1/settings/price", get(system::get_price))
        .route("/api/v1/admin/settings/price", post(system::set_price))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
