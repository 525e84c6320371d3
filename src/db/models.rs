use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SETTING_SYSTEM_ONLINE: &str = "system_online";
pub const SETTING_STATUS_MESSAGE: &str = "system_status_message";
pub const SETTING_PRICE_PER_MESSAGE: &str = "price_per_message_sats";

pub const DEFAULT_PRICE_PER_MESSAGE_SATS: i64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub npub: String,
    pub balance_sats: i64,
    pub total_spent: i64,
    pub total_deposited: i64,
    pub message_count: i64,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Spend,
}

/// Audit row. Amounts are stored as positive magnitudes; `kind` carries the direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: String,
    pub npub: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: TransactionType,
    pub amount_sats: i64,
    pub payment_hash: Option<String>,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction<'a> {
    pub npub: &'a str,
    pub kind: TransactionType,
    pub amount_sats: i64,
    pub payment_hash: Option<&'a str>,
    pub memo: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TopUpRequest {
    pub id: String,
    pub npub: String,
    pub amount_sats: i64,
    pub payment_hash: String,
    pub bolt11: String,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Stats {
    pub total_users: i64,
    pub total_balance_sats: i64,
    pub total_spent_sats: i64,
    pub total_deposited_sats: i64,
    pub total_messages: i64,
    pub pending_topups: i64,
}

/// Admin overrides for a user row; `None` leaves a column untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserStatsUpdate {
    pub balance_sats: Option<i64>,
    pub total_spent: Option<i64>,
    pub total_deposited: Option<i64>,
    pub message_count: Option<i64>,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub online: bool,
    pub message: String,
}
