use sqlx::SqlitePool;

use crate::{
    db::{
        models::{
            DEFAULT_PRICE_PER_MESSAGE_SATS, SETTING_PRICE_PER_MESSAGE, SETTING_STATUS_MESSAGE,
            SETTING_SYSTEM_ONLINE, SystemStatus,
        },
        queries,
    },
    error::{LedgerError, Result},
};

pub async fn system_status(pool: &SqlitePool) -> Result<SystemStatus> {
    let rows =
        queries::get_settings(pool, &[SETTING_SYSTEM_ONLINE, SETTING_STATUS_MESSAGE]).await?;

    let mut status = SystemStatus {
        online: true,
        message: String::new(),
    };
    for (key, value) in rows {
        match key.as_str() {
            SETTING_SYSTEM_ONLINE => status.online = value != "false",
            SETTING_STATUS_MESSAGE => status.message = value,
            _ => {}
        }
    }

    Ok(status)
}

/// A missing message clears the stored one.
pub async fn set_system_status(
    pool: &SqlitePool,
    online: bool,
    message: Option<&str>,
) -> Result<SystemStatus> {
    let message = message.unwrap_or_default().trim();

    let mut tx = pool.begin().await?;
    queries::set_setting(&mut *tx, SETTING_SYSTEM_ONLINE, if online { "true" } else { "false" })
        .await?;
    queries::set_setting(&mut *tx, SETTING_STATUS_MESSAGE, message).await?;
    tx.commit().await?;

    tracing::info!(online, message, "system status changed");
    Ok(SystemStatus {
        online,
        message: message.to_string(),
    })
}

/// Fails with [`LedgerError::SystemOffline`] while the system is switched off.
pub async fn ensure_online(pool: &SqlitePool) -> Result<()> {
    let status = system_status(pool).await?;
    if status.online {
        return Ok(());
    }

    let message = if status.message.is_empty() {
        "System is offline".to_string()
    } else {
        status.message
    };
    Err(LedgerError::SystemOffline(message))
}

pub async fn price_per_message(pool: &SqlitePool) -> Result<i64> {
    let rows = queries::get_settings(pool, &[SETTING_PRICE_PER_MESSAGE]).await?;

    let price = match rows.into_iter().next() {
        Some((_, value)) => value.parse::<i64>().unwrap_or_else(|_| {
            tracing::warn!(%value, "unparsable price setting, using default");
            DEFAULT_PRICE_PER_MESSAGE_SATS
        }),
        None => DEFAULT_PRICE_PER_MESSAGE_SATS,
    };

    Ok(price)
}

pub async fn set_price_per_message(pool: &SqlitePool, price_sats: i64) -> Result<i64> {
    if price_sats < 0 {
        return Err(LedgerError::invalid("Price must not be negative"));
    }

    queries::set_setting(pool, SETTING_PRICE_PER_MESSAGE, &price_sats.to_string()).await?;

    tracing::info!(price_sats, "price per message changed");
    Ok(price_sats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_defaults_after_migration() {
        let pool = test_pool().await;

        let status = system_status(&pool).await.unwrap();
        assert!(status.online);
        assert_eq!(status.message, "");
        assert_eq!(price_per_message(&pool).await.unwrap(), 1);
        assert!(ensure_online(&pool).await.is_ok());
    }

    #[tokio::test]
    async fn test_offline_toggle() {
        let pool = test_pool().await;

        set_system_status(&pool, false, Some("satellite pass in 10 min"))
            .await
            .unwrap();
        let status = system_status(&pool).await.unwrap();
        assert!(!status.online);
        assert_eq!(status.message, "satellite pass in 10 min");

        match ensure_online(&pool).await {
            Err(LedgerError::SystemOffline(message)) => {
                assert_eq!(message, "satellite pass in 10 min")
            }
            other => panic!("expected offline error, got {other:?}"),
        }

        set_system_status(&pool, true, None).await.unwrap();
        let status = system_status(&pool).await.unwrap();
        assert!(status.online);
        assert_eq!(status.message, "");
    }

    #[tokio::test]
    async fn test_offline_without_message() {
        let pool = test_pool().await;
        set_system_status(&pool, false, None).await.unwrap();

        match ensure_online(&pool).await {
            Err(LedgerError::SystemOffline(message)) => assert_eq!(message, "System is offline"),
            other => panic!("expected offline error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_price_update() {
        let pool = test_pool().await;

        assert_eq!(set_price_per_message(&pool, 5).await.unwrap(), 5);
        assert_eq!(price_per_message(&pool).await.unwrap(), 5);

        let result = set_price_per_message(&pool, -1).await;
        assert!(matches!(result, Err(LedgerError::InvalidArgument(_))));
        assert_eq!(price_per_message(&pool).await.unwrap(), 5);
    }
}
