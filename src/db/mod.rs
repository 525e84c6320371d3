pub mod models;
pub mod queries;

use std::{str::FromStr, time::Duration};

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

use crate::error::Result;

pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    // WAL plus a busy timeout lets concurrent writers queue on the write lock
    // instead of failing with SQLITE_BUSY.
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(10));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!(max_connections, "Connected to database: {}", database_url);

    Ok(pool)
}

/// Fresh, migrated database file for one test.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let path = std::env::temp_dir().join(format!("bitsatcredit-{}.db", uuid::Uuid::new_v4()));
    init_pool(&format!("sqlite://{}", path.display()), 8)
        .await
        .unwrap()
}
