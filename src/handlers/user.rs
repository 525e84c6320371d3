use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};

use crate::{
    app_state::AppState,
    db::{
        models::{Transaction, User},
        queries,
    },
    error::Result,
    ledger::{balance, settings},
};

/// Transactions returned by the user history route.
const HISTORY_LIMIT: i64 = 100;

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub npub: String,
    pub balance_sats: i64,
    pub total_spent: i64,
    pub total_deposited: i64,
    pub message_count: i64,
}

impl From<User> for BalanceResponse {
    fn from(user: User) -> Self {
        Self {
            npub: user.npub,
            balance_sats: user.balance_sats,
            total_spent: user.total_spent,
            total_deposited: user.total_deposited,
            message_count: user.message_count,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AmountQuery {
    pub amount: Option<i64>,
    pub memo: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CanSpendResponse {
    pub npub: String,
    pub amount_requested: i64,
    pub current_balance: i64,
    pub can_afford: bool,
    pub shortfall: i64,
}

/// GET /api/v1/user/{npub}
pub async fn get_user(
    State(state): State<AppState>,
    Path(npub): Path<String>,
) -> Result<Json<User>> {
    let user = balance::get_or_create_user(&state.pool, &npub).await?;
    Ok(Json(user))
}

/// GET /api/v1/user/{npub}/balance
pub async fn get_balance(
    State(state): State<AppState>,
    Path(npub): Path<String>,
) -> Result<Json<BalanceResponse>> {
    let user = balance::get_or_create_user(&state.pool, &npub).await?;
    Ok(Json(user.into()))
}

/// GET /api/v1/user/{npub}/can-spend?amount=N
///
/// Advisory only: the answer can be stale by the time a spend arrives.
pub async fn can_spend(
    State(state): State<AppState>,
    Path(npub): Path<String>,
    Query(params): Query<AmountQuery>,
) -> Result<Json<CanSpendResponse>> {
    let amount = match params.amount {
        Some(amount) => amount,
        None => settings::price_per_message(&state.pool).await?,
    };
    let user = balance::get_or_create_user(&state.pool, &npub).await?;

    Ok(Json(CanSpendResponse {
        can_afford: user.balance_sats >= amount,
        shortfall: (amount - user.balance_sats).max(0),
        amount_requested: amount,
        current_balance: user.balance_sats,
        npub: user.npub,
    }))
}

/// POST /api/v1/user/{npub}/spend?amount=N&memo=
pub async fn spend(
    State(state): State<AppState>,
    Path(npub): Path<String>,
    Query(params): Query<AmountQuery>,
) -> Result<Json<User>> {
    settings::ensure_online(&state.pool).await?;

    let amount = match params.amount {
        Some(amount) => amount,
        None => settings::price_per_message(&state.pool).await?,
    };
    let user = balance::spend(&state.pool, &npub, amount, params.memo.as_deref()).await?;

    tracing::debug!(npub = %npub, amount, balance = user.balance_sats, "message paid");
    Ok(Json(user))
}

/// GET /api/v1/user/{npub}/transactions
pub async fn get_transactions(
    State(state): State<AppState>,
    Path(npub): Path<String>,
) -> Result<Json<Vec<Transaction>>> {
    let transactions = queries::get_user_transactions(&state.pool, &npub, HISTORY_LIMIT).await?;
    Ok(Json(transactions))
}
