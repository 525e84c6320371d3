//! Bridge from the host's "invoice paid" stream to top-up settlement.
//!
//! The host shares one payment stream between every extension and the base
//! wallet, so events not tagged [`TOPUP_TAG`] are dropped. Delivery is
//! at-least-once; redelivered events are absorbed by the idempotent
//! [`topup::settle_top_up`].

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    error::Result,
    ledger::topup::{self, SettleOutcome, TOPUP_TAG},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub payment_hash: String,
    #[serde(default)]
    pub amount_msat: i64,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PaymentEvent {
    pub fn tag(&self) -> Option<&str> {
        self.extra.get("tag").and_then(|v| v.as_str())
    }
}

/// Route one payment event. Returns `None` when the payment is not a top-up.
pub async fn handle_payment(
    pool: &SqlitePool,
    event: &PaymentEvent,
) -> Result<Option<SettleOutcome>> {
    if event.tag() != Some(TOPUP_TAG) {
        tracing::debug!(payment_hash = %event.payment_hash, "Ignoring non-topup payment");
        return Ok(None);
    }

    tracing::info!(
        payment_hash = %event.payment_hash,
        amount_msat = event.amount_msat,
        "Top-up invoice paid"
    );

    let outcome = topup::settle_top_up(pool, &event.payment_hash).await?;
    match &outcome {
        SettleOutcome::Settled(request) => {
            tracing::info!(
                npub = %request.npub,
                amount_sats = request.amount_sats,
                "User credited"
            );
        }
        SettleOutcome::AlreadySettled => {
            tracing::warn!(payment_hash = %event.payment_hash, "Payment already processed");
        }
        SettleOutcome::Unknown => {
            tracing::warn!(payment_hash = %event.payment_hash, "No top-up request for payment");
        }
    }

    Ok(Some(outcome))
}

/// Single consumer of the payment queue, alive for the whole process.
pub struct PaymentListener {
    pool: SqlitePool,
    events: mpsc::Receiver<PaymentEvent>,
    shutdown: watch::Receiver<bool>,
}

impl PaymentListener {
    pub fn new(
        pool: SqlitePool,
        events: mpsc::Receiver<PaymentEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pool,
            events,
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until shutdown is signalled or every sender is gone. An event is
    /// always handled to completion before shutdown is checked again, and
    /// events already queued at shutdown are drained.
    pub async fn run(mut self) {
        tracing::info!("BitSatCredit payment listener started");

        loop {
            let event = tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                event = self.events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            self.process(&event).await;
        }

        self.events.close();
        while let Some(event) = self.events.recv().await {
            self.process(&event).await;
        }

        tracing::info!("BitSatCredit payment listener stopped");
    }

    async fn process(&self, event: &PaymentEvent) {
        if let Err(e) = handle_payment(&self.pool, event).await {
            tracing::error!(
                payment_hash = %event.payment_hash,
                "Error processing top-up payment: {}",
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{queries, test_pool},
        ledger::{balance, topup::request_top_up},
        lightning::MockIssuer,
    };

    fn event(payment_hash: &str, tag: Option<&str>) -> PaymentEvent {
        let mut extra = serde_json::Map::new();
        if let Some(tag) = tag {
            extra.insert("tag".into(), tag.into());
        }
        PaymentEvent {
            payment_hash: payment_hash.to_string(),
            amount_msat: 500_000,
            extra,
        }
    }

    #[tokio::test]
    async fn test_foreign_tags_ignored() {
        let pool = test_pool().await;
        let invoice = request_top_up(&pool, &MockIssuer, "npub1", 500, "wallet1")
            .await
            .unwrap();

        for tag in [None, Some("lnurlp"), Some("splitpayments")] {
            let outcome = handle_payment(&pool, &event(&invoice.payment_hash, tag))
                .await
                .unwrap();
            assert!(outcome.is_none());
        }

        let pending = topup::get_top_up(&pool, &invoice.payment_hash).await.unwrap();
        assert!(!pending.paid);
    }

    #[tokio::test]
    async fn test_tagged_payment_settles() {
        let pool = test_pool().await;
        let invoice = request_top_up(&pool, &MockIssuer, "npub1", 500, "wallet1")
            .await
            .unwrap();

        let outcome = handle_payment(&pool, &event(&invoice.payment_hash, Some(TOPUP_TAG)))
            .await
            .unwrap();
        assert!(outcome.unwrap().is_settled());

        let redelivered = handle_payment(&pool, &event(&invoice.payment_hash, Some(TOPUP_TAG)))
            .await
            .unwrap();
        assert_eq!(redelivered, Some(SettleOutcome::AlreadySettled));
    }

    #[test]
    fn test_event_from_host_json() {
        let event: PaymentEvent = serde_json::from_str(
            r#"{
                "payment_hash": "abc",
                "amount_msat": 1000,
                "extra": {"tag": "bitsatcredit_topup", "npub": "npub1"}
            }"#,
        )
        .unwrap();
        assert_eq!(event.tag(), Some(TOPUP_TAG));

        let bare: PaymentEvent = serde_json::from_str(r#"{"payment_hash": "abc"}"#).unwrap();
        assert_eq!(bare.tag(), None);
        assert_eq!(bare.amount_msat, 0);
    }

    #[tokio::test]
    async fn test_listener_survives_failures_and_drains() {
        let pool = test_pool().await;
        let first = request_top_up(&pool, &MockIssuer, "npub1", 100, "wallet1")
            .await
            .unwrap();
        let second = request_top_up(&pool, &MockIssuer, "npub1", 200, "wallet1")
            .await
            .unwrap();

        let (tx, rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Queue everything before the listener starts, then ask it to stop:
        // queued events must still be handled.
        tx.send(event(&first.payment_hash, Some(TOPUP_TAG))).await.unwrap();
        tx.send(event("unknown-hash", Some(TOPUP_TAG))).await.unwrap();
        tx.send(event(&first.payment_hash, Some(TOPUP_TAG))).await.unwrap();
        tx.send(event("wallet-payment", None)).await.unwrap();
        tx.send(event(&second.payment_hash, Some(TOPUP_TAG))).await.unwrap();
        shutdown_tx.send(true).unwrap();

        PaymentListener::new(pool.clone(), rx, shutdown_rx)
            .spawn()
            .await
            .unwrap();

        let user = balance::get_user(&pool, "npub1").await.unwrap();
        assert_eq!(user.balance_sats, 300);
        let history = queries::get_user_transactions(&pool, "npub1", 100)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_listener_keeps_running_after_storage_error() {
        let pool = test_pool().await;
        let invoice = request_top_up(&pool, &MockIssuer, "npub1", 100, "wallet1")
            .await
            .unwrap();

        let (tx, rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = PaymentListener::new(pool.clone(), rx, shutdown_rx).spawn();

        // Drop the table so the next settlement fails with a storage error.
        sqlx::query("ALTER TABLE topup_requests RENAME TO topup_requests_moved")
            .execute(&pool)
            .await
            .unwrap();
        tx.send(event(&invoice.payment_hash, Some(TOPUP_TAG))).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(!handle.is_finished());

        sqlx::query("ALTER TABLE topup_requests_moved RENAME TO topup_requests")
            .execute(&pool)
            .await
            .unwrap();
        tx.send(event(&invoice.payment_hash, Some(TOPUP_TAG))).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let user = balance::get_user(&pool, "npub1").await.unwrap();
        assert_eq!(user.balance_sats, 100);
    }
}
