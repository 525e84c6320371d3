use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    db::{models::TopUpRequest, queries},
    error::{LedgerError, Result},
    ledger::{balance, short_npub, validate_amount, validate_npub},
    lightning::InvoiceIssuer,
};

/// Marker attached to every top-up invoice so the payment bridge can pick
/// ours out of the host's shared payment stream.
pub const TOPUP_TAG: &str = "bitsatcredit_topup";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopUpInvoice {
    pub topup_id: String,
    pub payment_hash: String,
    pub bolt11: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettleOutcome {
    /// Credit applied and deposit recorded.
    Settled(TopUpRequest),
    /// No top-up request carries this payment hash.
    Unknown,
    /// Redelivered notification; nothing changed.
    AlreadySettled,
}

impl SettleOutcome {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled(_))
    }
}

pub async fn request_top_up(
    pool: &SqlitePool,
    issuer: &dyn InvoiceIssuer,
    npub: &str,
    amount_sats: i64,
    wallet_id: &str,
) -> Result<TopUpInvoice> {
    validate_npub(npub)?;
    validate_amount(amount_sats)?;

    tracing::info!(npub = %short_npub(npub), amount_sats, "Generating top-up invoice");

    let memo = format!("BitSatRelay top-up for {}...", short_npub(npub));
    let extra = serde_json::json!({ "tag": TOPUP_TAG, "npub": npub });
    let issued = issuer
        .create_invoice(wallet_id, amount_sats, &memo, &extra)
        .await
        .map_err(|e| LedgerError::Lightning(e.to_string()))?;

    tracing::info!(payment_hash = %issued.payment_hash, tag = TOPUP_TAG, "Invoice created");

    let now = Utc::now();
    let mut tx = pool.begin().await?;
    queries::upsert_user(&mut *tx, npub, now).await?;
    let topup = queries::insert_topup_request(
        &mut *tx,
        npub,
        amount_sats,
        &issued.payment_hash,
        &issued.bolt11,
        now,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(topup_id = %topup.id, "Top-up request stored");

    Ok(TopUpInvoice {
        topup_id: topup.id,
        payment_hash: topup.payment_hash,
        bolt11: topup.bolt11,
    })
}

/// Mark the request paid, credit the user and record the deposit, all in
/// one transaction. Safe to call any number of times per payment hash.
pub async fn settle_top_up(pool: &SqlitePool, payment_hash: &str) -> Result<SettleOutcome> {
    let mut tx = pool.begin().await?;

    let Some(topup) = queries::mark_topup_paid(&mut *tx, payment_hash, Utc::now()).await? else {
        let outcome = match queries::get_topup_by_payment_hash(&mut *tx, payment_hash).await? {
            Some(_) => SettleOutcome::AlreadySettled,
            None => SettleOutcome::Unknown,
        };
        tx.rollback().await?;
        return Ok(outcome);
    };

    let memo = format!("Top-up: {} sats", topup.amount_sats);
    let (user, _) = balance::apply_and_record(
        &mut *tx,
        &topup.npub,
        topup.amount_sats,
        Some(payment_hash),
        Some(&memo),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        npub = %short_npub(&topup.npub),
        amount_sats = topup.amount_sats,
        balance = user.balance_sats,
        payment_hash,
        "Top-up settled"
    );

    Ok(SettleOutcome::Settled(topup))
}

pub async fn get_top_up(pool: &SqlitePool, payment_hash: &str) -> Result<TopUpRequest> {
    queries::get_topup_by_payment_hash(pool, payment_hash)
        .await?
        .ok_or_else(|| LedgerError::not_found("Top-up", payment_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{models::TransactionType, test_pool},
        lightning::{IssuedInvoice, MockIssuer},
    };
    use async_trait::async_trait;

    struct FailingIssuer;

    #[async_trait]
    impl InvoiceIssuer for FailingIssuer {
        async fn create_invoice(
            &self,
            _wallet_id: &str,
            _amount_sats: i64,
            _memo: &str,
            _extra: &serde_json::Value,
        ) -> anyhow::Result<IssuedInvoice> {
            Err(anyhow::anyhow!("wallet unreachable"))
        }
    }

    /// Records the memo and extra it was called with.
    struct RecordingIssuer(std::sync::Mutex<Vec<(String, serde_json::Value)>>);

    #[async_trait]
    impl InvoiceIssuer for RecordingIssuer {
        async fn create_invoice(
            &self,
            wallet_id: &str,
            amount_sats: i64,
            memo: &str,
            extra: &serde_json::Value,
        ) -> anyhow::Result<IssuedInvoice> {
            self.0
                .lock()
                .unwrap()
                .push((memo.to_string(), extra.clone()));
            MockIssuer
                .create_invoice(wallet_id, amount_sats, memo, extra)
                .await
        }
    }

    #[tokio::test]
    async fn test_top_up_scenario() {
        let pool = test_pool().await;

        let invoice = request_top_up(&pool, &MockIssuer, "npub1", 500, "wallet1")
            .await
            .unwrap();
        let pending = get_top_up(&pool, &invoice.payment_hash).await.unwrap();
        assert!(!pending.paid);
        assert!(pending.paid_at.is_none());
        assert_eq!(pending.id, invoice.topup_id);
        assert_eq!(pending.bolt11, invoice.bolt11);

        let user = balance::get_user(&pool, "npub1").await.unwrap();
        assert_eq!(user.balance_sats, 0);

        let outcome = settle_top_up(&pool, &invoice.payment_hash).await.unwrap();
        assert!(outcome.is_settled());

        let user = balance::get_user(&pool, "npub1").await.unwrap();
        assert_eq!(user.balance_sats, 500);
        assert_eq!(user.total_deposited, 500);

        let history = queries::get_user_transactions(&pool, "npub1", 100)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransactionType::Deposit);
        assert_eq!(history[0].amount_sats, 500);
        assert_eq!(
            history[0].payment_hash.as_deref(),
            Some(invoice.payment_hash.as_str())
        );
        assert_eq!(history[0].memo.as_deref(), Some("Top-up: 500 sats"));

        let paid = get_top_up(&pool, &invoice.payment_hash).await.unwrap();
        assert!(paid.paid);
        assert!(paid.paid_at.is_some());
    }

    #[tokio::test]
    async fn test_settle_twice_credits_once() {
        let pool = test_pool().await;
        let invoice = request_top_up(&pool, &MockIssuer, "npub1", 250, "wallet1")
            .await
            .unwrap();

        let first = settle_top_up(&pool, &invoice.payment_hash).await.unwrap();
        let second = settle_top_up(&pool, &invoice.payment_hash).await.unwrap();
        assert!(first.is_settled());
        assert_eq!(second, SettleOutcome::AlreadySettled);

        let user = balance::get_user(&pool, "npub1").await.unwrap();
        assert_eq!(user.balance_sats, 250);
        let history = queries::get_user_transactions(&pool, "npub1", 100)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_redelivery_credits_once() {
        let pool = test_pool().await;
        let invoice = request_top_up(&pool, &MockIssuer, "npub1", 100, "wallet1")
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let pool = pool.clone();
            let hash = invoice.payment_hash.clone();
            handles.push(tokio::spawn(async move {
                settle_top_up(&pool, &hash).await
            }));
        }

        let mut settled = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_settled() {
                settled += 1;
            }
        }
        assert_eq!(settled, 1);

        let user = balance::get_user(&pool, "npub1").await.unwrap();
        assert_eq!(user.balance_sats, 100);
    }

    #[tokio::test]
    async fn test_unknown_hash_changes_nothing() {
        let pool = test_pool().await;
        balance::adjust_balance(&pool, "npub1", 10, None).await.unwrap();
        let before = queries::get_stats(&pool).await.unwrap();

        let outcome = settle_top_up(&pool, "deadbeef").await.unwrap();
        assert_eq!(outcome, SettleOutcome::Unknown);
        assert!(!outcome.is_settled());

        let after = queries::get_stats(&pool).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_amount_must_be_positive() {
        let pool = test_pool().await;
        for amount in [0, -5] {
            let result = request_top_up(&pool, &MockIssuer, "npub1", amount, "wallet1").await;
            assert!(matches!(result, Err(LedgerError::InvalidArgument(_))));
        }
        assert_eq!(queries::get_stats(&pool).await.unwrap().pending_topups, 0);
    }

    #[tokio::test]
    async fn test_issuer_failure_stores_nothing() {
        let pool = test_pool().await;
        let result = request_top_up(&pool, &FailingIssuer, "npub1", 100, "wallet1").await;
        assert!(matches!(result, Err(LedgerError::Lightning(_))));
        assert_eq!(queries::get_stats(&pool).await.unwrap().pending_topups, 0);
    }

    #[tokio::test]
    async fn test_invoice_tagged_for_bridge() {
        let pool = test_pool().await;
        let issuer = RecordingIssuer(std::sync::Mutex::new(Vec::new()));

        request_top_up(&pool, &issuer, "npub1averyveryverylongkey", 42, "wallet1")
            .await
            .unwrap();

        let calls = issuer.0.lock().unwrap();
        let (memo, extra) = &calls[0];
        assert_eq!(memo, "BitSatRelay top-up for npub1averyveryve...");
        assert_eq!(extra["tag"], TOPUP_TAG);
        assert_eq!(extra["npub"], "npub1averyveryverylongkey");
    }
}
