use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    db::{
        models::{NewTransaction, Transaction, TransactionType, User},
        queries,
    },
    error::{LedgerError, Result},
    ledger::{validate_amount, validate_npub},
};

/// Get-or-create: unknown npubs get a zero-balance row.
pub async fn get_or_create_user(pool: &SqlitePool, npub: &str) -> Result<User> {
    validate_npub(npub)?;
    queries::upsert_user(pool, npub, Utc::now()).await
}

pub async fn get_user(pool: &SqlitePool, npub: &str) -> Result<User> {
    queries::get_user(pool, npub)
        .await?
        .ok_or_else(|| LedgerError::not_found("User", npub))
}

/// Apply a signed delta to a user's balance and append the matching audit row.
///
/// Overdrafts are not refused here so that admin corrections can go through;
/// relay spends use [`spend`], which checks funds atomically.
pub async fn adjust_balance(
    pool: &SqlitePool,
    npub: &str,
    delta_sats: i64,
    memo: Option<&str>,
) -> Result<User> {
    validate_npub(npub)?;
    if delta_sats == 0 {
        return Err(LedgerError::invalid("Balance delta must not be zero"));
    }

    let mut tx = pool.begin().await?;
    let (user, _) = apply_and_record(&mut *tx, npub, delta_sats, None, memo).await?;
    tx.commit().await?;

    tracing::debug!(npub, delta_sats, balance = user.balance_sats, "balance adjusted");
    Ok(user)
}

/// Append one audit row without touching the balance.
pub async fn record_transaction(
    pool: &SqlitePool,
    npub: &str,
    kind: TransactionType,
    amount_sats: i64,
    payment_hash: Option<&str>,
    memo: Option<&str>,
) -> Result<Transaction> {
    validate_npub(npub)?;
    validate_amount(amount_sats)?;

    let now = Utc::now();
    let mut tx = pool.begin().await?;
    queries::upsert_user(&mut *tx, npub, now).await?;
    let new = NewTransaction {
        npub,
        kind,
        amount_sats,
        payment_hash,
        memo,
    };
    let transaction = queries::insert_transaction(&mut *tx, &new, now).await?;
    tx.commit().await?;

    Ok(transaction)
}

pub async fn increment_message_count(pool: &SqlitePool, npub: &str) -> Result<User> {
    validate_npub(npub)?;

    let now = Utc::now();
    let mut tx = pool.begin().await?;
    queries::upsert_user(&mut *tx, npub, now).await?;
    let user = queries::increment_message_count(&mut *tx, npub, now)
        .await?
        .ok_or_else(|| LedgerError::not_found("User", npub))?;
    tx.commit().await?;

    Ok(user)
}

/// Debit `amount_sats` for one relayed message.
///
/// The funds check and the debit are one conditional `UPDATE`, so two
/// concurrent spends can never both pass against the same balance. On
/// failure nothing is written.
pub async fn spend(
    pool: &SqlitePool,
    npub: &str,
    amount_sats: i64,
    memo: Option<&str>,
) -> Result<User> {
    validate_amount(amount_sats)?;

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    if queries::debit_if_covered(&mut *tx, npub, amount_sats, now)
        .await?
        .is_none()
    {
        return match queries::get_user(&mut *tx, npub).await? {
            None => Err(LedgerError::not_found("User", npub)),
            Some(user) => Err(LedgerError::InsufficientBalance {
                have: user.balance_sats,
                need: amount_sats,
            }),
        };
    }

    let new = NewTransaction {
        npub,
        kind: TransactionType::Spend,
        amount_sats,
        payment_hash: None,
        memo,
    };
    queries::insert_transaction(&mut *tx, &new, now).await?;

    let user = queries::increment_message_count(&mut *tx, npub, now)
        .await?
        .ok_or_else(|| LedgerError::not_found("User", npub))?;
    tx.commit().await?;

    tracing::debug!(npub, amount_sats, balance = user.balance_sats, "spend recorded");
    Ok(user)
}

/// Balance change plus audit row on a connection that is already inside a
/// transaction. The user row is created if missing.
pub(crate) async fn apply_and_record(
    conn: &mut SqliteConnection,
    npub: &str,
    delta_sats: i64,
    payment_hash: Option<&str>,
    memo: Option<&str>,
) -> Result<(User, Transaction)> {
    let now = Utc::now();
    queries::upsert_user(&mut *conn, npub, now).await?;

    let user = queries::apply_balance_delta(&mut *conn, npub, delta_sats, now)
        .await?
        .ok_or_else(|| LedgerError::not_found("User", npub))?;

    let kind = if delta_sats > 0 {
        TransactionType::Deposit
    } else {
        TransactionType::Spend
    };
    let new = NewTransaction {
        npub,
        kind,
        amount_sats: delta_sats.saturating_abs(),
        payment_hash,
        memo,
    };
    let transaction = queries::insert_transaction(&mut *conn, &new, now).await?;

    Ok((user, transaction))
}
