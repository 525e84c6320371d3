use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite};

use crate::{
    db::models::{NewTransaction, Stats, TopUpRequest, Transaction, User, UserStatsUpdate},
    error::Result,
};

// Every function runs a single statement so it can be handed either the pool
// or an open transaction. Transactions are append-only, so rowid order is
// insertion order.

pub async fn get_user<'e, E>(executor: E, npub: &str) -> Result<Option<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE npub = ?")
        .bind(npub)
        .fetch_optional(executor)
        .await?;

    Ok(user)
}

/// Insert a zero-balance row for `npub` unless one exists, and return the row.
/// An existing row comes back unchanged.
pub async fn upsert_user<'e, E>(executor: E, npub: &str, now: DateTime<Utc>) -> Result<User>
where
    E: Executor<'e, Database = Sqlite>,
{
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (npub, balance_sats, total_spent, total_deposited, message_count,
         created_at, updated_at)
         VALUES (?, 0, 0, 0, 0, ?, ?)
         ON CONFLICT(npub) DO UPDATE SET npub = excluded.npub
         RETURNING *",
    )
    .bind(npub)
    .bind(now)
    .bind(now)
    .fetch_one(executor)
    .await?;

    Ok(user)
}

/// Relative balance update. Positive deltas count as deposits, negative as spends.
pub async fn apply_balance_delta<'e, E>(
    executor: E,
    npub: &str,
    delta_sats: i64,
    now: DateTime<Utc>,
) -> Result<Option<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let deposited = delta_sats.max(0);
    let spent = delta_sats.min(0).saturating_neg();

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET balance_sats = balance_sats + ?,
         total_deposited = total_deposited + ?,
         total_spent = total_spent + ?,
         updated_at = ?
         WHERE npub = ?
         RETURNING *",
    )
    .bind(delta_sats)
    .bind(deposited)
    .bind(spent)
    .bind(now)
    .bind(npub)
    .fetch_optional(executor)
    .await?;

    Ok(user)
}

/// Debit only when the balance covers `amount_sats`. Returns `None` when the
/// user is missing or short of funds.
pub async fn debit_if_covered<'e, E>(
    executor: E,
    npub: &str,
    amount_sats: i64,
    now: DateTime<Utc>,
) -> Result<Option<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET balance_sats = balance_sats - ?,
         total_spent = total_spent + ?,
         updated_at = ?
         WHERE npub = ? AND balance_sats >= ?
         RETURNING *",
    )
    .bind(amount_sats)
    .bind(amount_sats)
    .bind(now)
    .bind(npub)
    .bind(amount_sats)
    .fetch_optional(executor)
    .await?;

    Ok(user)
}

pub async fn increment_message_count<'e, E>(
    executor: E,
    npub: &str,
    now: DateTime<Utc>,
) -> Result<Option<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET message_count = message_count + 1, updated_at = ?
         WHERE npub = ?
         RETURNING *",
    )
    .bind(now)
    .bind(npub)
    .fetch_optional(executor)
    .await?;

    Ok(user)
}

pub async fn update_user_stats<'e, E>(
    executor: E,
    npub: &str,
    update: &UserStatsUpdate,
    now: DateTime<Utc>,
) -> Result<Option<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET balance_sats = COALESCE(?, balance_sats),
         total_spent = COALESCE(?, total_spent),
         total_deposited = COALESCE(?, total_deposited),
         message_count = COALESCE(?, message_count),
         memo = COALESCE(?, memo),
         updated_at = ?
         WHERE npub = ?
         RETURNING *",
    )
    .bind(update.balance_sats)
    .bind(update.total_spent)
    .bind(update.total_deposited)
    .bind(update.message_count)
    .bind(update.memo.as_deref())
    .bind(now)
    .bind(npub)
    .fetch_optional(executor)
    .await?;

    Ok(user)
}

/// Transactions and top-up requests go with the user through `ON DELETE CASCADE`.
pub async fn delete_user<'e, E>(executor: E, npub: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM users WHERE npub = ?")
        .bind(npub)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn list_users<'e, E>(executor: E, limit: i64, offset: i64) -> Result<Vec<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users ORDER BY updated_at DESC, rowid DESC LIMIT ? OFFSET ?",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await?;

    Ok(users)
}

pub async fn get_stats<'e, E>(executor: E) -> Result<Stats>
where
    E: Executor<'e, Database = Sqlite>,
{
    let stats = sqlx::query_as::<_, Stats>(
        "SELECT COUNT(*) AS total_users,
         COALESCE(SUM(balance_sats), 0) AS total_balance_sats,
         COALESCE(SUM(total_spent), 0) AS total_spent_sats,
         COALESCE(SUM(total_deposited), 0) AS total_deposited_sats,
         COALESCE(SUM(message_count), 0) AS total_messages,
         (SELECT COUNT(*) FROM topup_requests WHERE paid = 0) AS pending_topups
         FROM users",
    )
    .fetch_one(executor)
    .await?;

    Ok(stats)
}

pub async fn insert_transaction<'e, E>(
    executor: E,
    new: &NewTransaction<'_>,
    now: DateTime<Utc>,
) -> Result<Transaction>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = uuid::Uuid::new_v4().to_string();

    let transaction = sqlx::query_as::<_, Transaction>(
        "INSERT INTO transactions (id, npub, type, amount_sats, payment_hash, memo, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(id)
    .bind(new.npub)
    .bind(new.kind)
    .bind(new.amount_sats)
    .bind(new.payment_hash)
    .bind(new.memo)
    .bind(now)
    .fetch_one(executor)
    .await?;

    Ok(transaction)
}

pub async fn get_user_transactions<'e, E>(
    executor: E,
    npub: &str,
    limit: i64,
) -> Result<Vec<Transaction>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let transactions = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE npub = ?
         ORDER BY rowid DESC
         LIMIT ?",
    )
    .bind(npub)
    .bind(limit)
    .fetch_all(executor)
    .await?;

    Ok(transactions)
}

pub async fn get_recent_transactions<'e, E>(executor: E, limit: i64) -> Result<Vec<Transaction>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let transactions = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions ORDER BY rowid DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(executor)
    .await?;

    Ok(transactions)
}

pub async fn insert_topup_request<'e, E>(
    executor: E,
    npub: &str,
    amount_sats: i64,
    payment_hash: &str,
    bolt11: &str,
    now: DateTime<Utc>,
) -> Result<TopUpRequest>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = uuid::Uuid::new_v4().to_string();

    let topup = sqlx::query_as::<_, TopUpRequest>(
        "INSERT INTO topup_requests (id, npub, amount_sats, payment_hash, bolt11, paid, created_at)
         VALUES (?, ?, ?, ?, ?, 0, ?)
         RETURNING *",
    )
    .bind(id)
    .bind(npub)
    .bind(amount_sats)
    .bind(payment_hash)
    .bind(bolt11)
    .bind(now)
    .fetch_one(executor)
    .await?;

    Ok(topup)
}

pub async fn get_topup_by_payment_hash<'e, E>(
    executor: E,
    payment_hash: &str,
) -> Result<Option<TopUpRequest>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let topup = sqlx::query_as::<_, TopUpRequest>(
        "SELECT * FROM topup_requests WHERE payment_hash = ?",
    )
    .bind(payment_hash)
    .fetch_optional(executor)
    .await?;

    Ok(topup)
}

/// Flip `paid` from false to true. Returns `None` if the hash is unknown or
/// the request was already paid.
pub async fn mark_topup_paid<'e, E>(
    executor: E,
    payment_hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<TopUpRequest>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let topup = sqlx::query_as::<_, TopUpRequest>(
        "UPDATE topup_requests SET paid = 1, paid_at = ?
         WHERE payment_hash = ? AND paid = 0
         RETURNING *",
    )
    .bind(now)
    .bind(payment_hash)
    .fetch_optional(executor)
    .await?;

    Ok(topup)
}

pub async fn get_settings<'e, E>(executor: E, keys: &[&str]) -> Result<Vec<(String, String)>>
where
    E: Executor<'e, Database = Sqlite>,
{
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; keys.len()].join(", ");
    let sql = format!("SELECT key, value FROM settings WHERE key IN ({placeholders})");

    let mut query = sqlx::query_as::<_, (String, String)>(&sql);
    for key in keys {
        query = query.bind(*key);
    }

    Ok(query.fetch_all(executor).await?)
}

pub async fn set_setting<'e, E>(executor: E, key: &str, value: &str) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(executor)
    .await?;

    Ok(())
}
