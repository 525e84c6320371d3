use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::{
    app_state::AppState,
    db::models::TopUpRequest,
    error::{LedgerError, Result},
    ledger::{
        settings,
        topup::{self, TopUpInvoice},
    },
};

/// LNbits picks the wallet from its invoice key, so the id is only a label.
const LNBITS_WALLET: &str = "lnbits";

#[derive(Debug, Deserialize)]
pub struct WalletQuery {
    pub wallet_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTopUpRequest {
    pub npub: String,
    pub amount_sats: i64,
}

/// POST /api/v1/topup?wallet_id=
pub async fn create_topup(
    State(state): State<AppState>,
    Query(query): Query<WalletQuery>,
    Json(req): Json<CreateTopUpRequest>,
) -> Result<Json<TopUpInvoice>> {
    issue(&state, query.wallet_id, &req).await
}

/// POST /api/v1/user/{npub}/topup?wallet_id=
pub async fn create_user_topup(
    State(state): State<AppState>,
    Path(npub): Path<String>,
    Query(query): Query<WalletQuery>,
    Json(req): Json<CreateTopUpRequest>,
) -> Result<Json<TopUpInvoice>> {
    if req.npub != npub {
        return Err(LedgerError::invalid("npub in body does not match path"));
    }
    issue(&state, query.wallet_id, &req).await
}

/// GET /api/v1/topup/{payment_hash}
pub async fn get_topup(
    State(state): State<AppState>,
    Path(payment_hash): Path<String>,
) -> Result<Json<TopUpRequest>> {
    let request = topup::get_top_up(&state.pool, &payment_hash).await?;
    Ok(Json(request))
}

async fn issue(
    state: &AppState,
    wallet_id: Option<String>,
    req: &CreateTopUpRequest,
) -> Result<Json<TopUpInvoice>> {
    settings::ensure_online(&state.pool).await?;

    let wallet_id = wallet_id
        .filter(|w| !w.is_empty())
        .or_else(|| state.config.default_wallet_id.clone())
        .or_else(|| (state.config.issuer_kind() == "lnbits").then(|| LNBITS_WALLET.to_string()))
        .ok_or_else(|| LedgerError::invalid("wallet_id is required"))?;

    let invoice = topup::request_top_up(
        &state.pool,
        state.lightning.as_ref(),
        &req.npub,
        req.amount_sats,
        &wallet_id,
    )
    .await?;

    Ok(Json(invoice))
}
