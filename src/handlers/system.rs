use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use super::auth::AdminKey;
use crate::{
    app_state::AppState,
    db::models::SystemStatus,
    error::Result,
    ledger::settings,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub online: bool,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PriceBody {
    pub price_per_message_sats: i64,
}

/// GET /api/v1/health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "bitsatcredit".to_string(),
    })
}

/// GET /api/v1/system/status
pub async fn get_status(State(state): State<AppState>) -> Result<Json<SystemStatus>> {
    let status = settings::system_status(&state.pool).await?;
    Ok(Json(status))
}

/// POST /api/v1/admin/system/status
pub async fn set_status(
    _admin: AdminKey,
    State(state): State<AppState>,
    Json(req): Json<SetStatusRequest>,
) -> Result<Json<SystemStatus>> {
    let status =
        settings::set_system_status(&state.pool, req.online, req.message.as_deref()).await?;
    Ok(Json(status))
}

/// GET /api/v1/settings/price
pub async fn get_price(State(state): State<AppState>) -> Result<Json<PriceBody>> {
    let price = settings::price_per_message(&state.pool).await?;
    Ok(Json(PriceBody {
        price_per_message_sats: price,
    }))
}

/// POST /api/v1/admin/settings/price
pub async fn set_price(
    _admin: AdminKey,
    State(state): State<AppState>,
    Json(req): Json<PriceBody>,
) -> Result<Json<PriceBody>> {
    let price = settings::set_price_per_message(&state.pool, req.price_per_message_sats).await?;
    Ok(Json(PriceBody {
        price_per_message_sats: price,
    }))
}
