//! Operator routes. Every handler takes [`AdminKey`], so the gate runs before
//! any body is parsed.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;

use super::auth::AdminKey;
use crate::{
    app_state::AppState,
    db::{
        models::{Stats, Transaction, User, UserStatsUpdate},
        queries,
    },
    error::{LedgerError, Result},
    ledger::balance,
};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[derive(Debug, Deserialize)]
pub struct AddCreditsRequest {
    pub npub: String,
    pub amount_sats: i64,
    pub memo: Option<String>,
}

/// GET /api/v1/users?limit&offset
pub async fn list_users(
    _admin: AdminKey,
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<User>>> {
    let users = queries::list_users(&state.pool, page.limit(), page.offset()).await?;
    Ok(Json(users))
}

/// GET /api/v1/transactions/recent?limit
pub async fn recent_transactions(
    _admin: AdminKey,
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Transaction>>> {
    let transactions = queries::get_recent_transactions(&state.pool, page.limit()).await?;
    Ok(Json(transactions))
}

/// GET /api/v1/stats
pub async fn stats(_admin: AdminKey, State(state): State<AppState>) -> Result<Json<Stats>> {
    let stats = queries::get_stats(&state.pool).await?;
    Ok(Json(stats))
}

/// POST /api/v1/admin/add-credits
pub async fn add_credits(
    _admin: AdminKey,
    State(state): State<AppState>,
    Json(req): Json<AddCreditsRequest>,
) -> Result<Json<User>> {
    if req.amount_sats < 1 {
        return Err(LedgerError::invalid("Amount must be at least 1 sat"));
    }

    let memo = req
        .memo
        .unwrap_or_else(|| format!("Admin credit: {} sats", req.amount_sats));
    let user = balance::adjust_balance(&state.pool, &req.npub, req.amount_sats, Some(&memo)).await?;

    tracing::info!(npub = %req.npub, amount_sats = req.amount_sats, "admin credit applied");
    Ok(Json(user))
}

/// DELETE /api/v1/admin/user/{npub}
pub async fn delete_user(
    _admin: AdminKey,
    State(state): State<AppState>,
    Path(npub): Path<String>,
) -> Result<StatusCode> {
    if !queries::delete_user(&state.pool, &npub).await? {
        return Err(LedgerError::not_found("User", npub));
    }

    tracing::info!(npub = %npub, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/v1/admin/user/{npub}/stats
///
/// Direct override of the stored row. No transaction is recorded, so the
/// balance can drift from the history afterwards.
pub async fn update_user_stats(
    _admin: AdminKey,
    State(state): State<AppState>,
    Path(npub): Path<String>,
    Json(update): Json<UserStatsUpdate>,
) -> Result<Json<User>> {
    let counters = [
        ("total_spent", update.total_spent),
        ("total_deposited", update.total_deposited),
        ("message_count", update.message_count),
    ];
    for (name, value) in counters {
        if value.is_some_and(|v| v < 0) {
            return Err(LedgerError::invalid(format!("{name} must not be negative")));
        }
    }

    let user = queries::update_user_stats(&state.pool, &npub, &update, Utc::now())
        .await?
        .ok_or_else(|| LedgerError::not_found("User", npub.as_str()))?;

    tracing::warn!(npub = %npub, "user stats overridden by admin");
    Ok(Json(user))
}
