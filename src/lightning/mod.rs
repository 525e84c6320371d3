pub mod lnbits;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use lightning_invoice::Bolt11Invoice;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};

use crate::config::Config;
use lnbits::LnbitsIssuer;

/// Newtype wrapper around Bolt11Invoice for convenience methods
#[derive(Debug, Clone)]
pub struct Invoice(Bolt11Invoice);

impl FromStr for Invoice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Bolt11Invoice::from_str(s)
            .map(Self)
            .map_err(|e| anyhow!("Invalid invoice: {}", e))
    }
}

impl Invoice {
    pub fn amount_msats(&self) -> Result<u64> {
        self.0
            .amount_milli_satoshis()
            .ok_or_else(|| anyhow!("Invoice must have an amount"))
    }

    pub fn payment_hash(&self) -> String {
        hex::encode(self.0.payment_hash().as_ref() as &[u8])
    }

    /// Check a freshly issued invoice against what the issuer claims it is.
    pub fn ensure_matches(&self, payment_hash: &str, amount_sats: i64) -> Result<()> {
        if !self.payment_hash().eq_ignore_ascii_case(payment_hash) {
            return Err(anyhow!(
                "Invoice payment hash {} doesn't match reported {}",
                self.payment_hash(),
                payment_hash
            ));
        }

        let expected_msats = u64::try_from(amount_sats)?.saturating_mul(1000);
        let amount_msats = self.amount_msats()?;
        if amount_msats != expected_msats {
            return Err(anyhow!(
                "Invoice amount {} msats doesn't match expected {} msats",
                amount_msats,
                expected_msats
            ));
        }

        Ok(())
    }
}

impl fmt::Display for Invoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the host hands back for a new invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedInvoice {
    pub payment_hash: String,
    pub bolt11: String,
}

#[async_trait]
pub trait InvoiceIssuer: Send + Sync {
    /// Create an incoming invoice on `wallet_id`. `extra` is attached to the
    /// payment and comes back in the settlement notification.
    async fn create_invoice(
        &self,
        wallet_id: &str,
        amount_sats: i64,
        memo: &str,
        extra: &serde_json::Value,
    ) -> Result<IssuedInvoice>;
}

/// Mock implementation for testing
pub struct MockIssuer;

#[async_trait]
impl InvoiceIssuer for MockIssuer {
    async fn create_invoice(
        &self,
        wallet_id: &str,
        amount_sats: i64,
        memo: &str,
        _extra: &serde_json::Value,
    ) -> Result<IssuedInvoice> {
        if amount_sats < 1 {
            return Err(anyhow!("Invoice amount must be positive"));
        }

        let payment_hash = hex::encode(rand::random::<[u8; 32]>());
        let bolt11 = format!("lnbcrt{}n1mock{}", amount_sats * 10, &payment_hash[..20]);

        tracing::debug!(wallet_id, memo, %payment_hash, "mock invoice issued");
        Ok(IssuedInvoice {
            payment_hash,
            bolt11,
        })
    }
}

/// LNbits when both its URL and invoice key are configured, the mock otherwise.
pub fn issuer_from_config(config: &Config) -> Result<Arc<dyn InvoiceIssuer>> {
    match (&config.lnbits_url, &config.lnbits_invoice_key) {
        (Some(url), Some(key)) => {
            tracing::info!("Using LNbits invoice issuer at {}", url);
            let webhook_url = config.webhook_url()?;
            if webhook_url.is_none() {
                tracing::warn!(
                    "PUBLIC_URL or WEBHOOK_SECRET unset, LNbits will not report paid invoices"
                );
            }
            let issuer = LnbitsIssuer::new(url, key, webhook_url)?;
            Ok(Arc::new(issuer))
        }
        (None, None) => {
            tracing::warn!("No LNbits backend configured, invoices are mocked");
            Ok(Arc::new(MockIssuer))
        }
        _ => Err(anyhow!(
            "LNBITS_URL and LNBITS_INVOICE_KEY must be set together"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    // BOLT11 test vectors sharing the payment hash 0001..0102: one for 2500u
    // (250,000 sats), one without an amount.
    const COFFEE_INVOICE: &str = "lnbc2500u1pvjluezsp5zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zygspp5qqqsyqcyq5rqwzqfqqqsyqcyq5rqwzqfqqqsyqcyq5rqwzqfqypqdq5xysxxatsyp3k7enxv4jsxqzpu9qrsgquk0rl77nj30yxdy8j9vdx85fkpmdla2087ne0xh8nhedh8w27kyke0lp53ut353s06fv3qfegext0eh0ymjpf39tuven09sam30g4vgpfna3rh";
    const DONATION_INVOICE: &str = "lnbc1pvjluezsp5zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zygspp5qqqsyqcyq5rqwzqfqqqsyqcyq5rqwzqfqqqsyqcyq5rqwzqfqypqdpl2pkx2ctnv5sxxmmwwd5kgetjypeh2ursdae8g6twvus8g6rfwvs8qun0dfjkxaq9qrsgq357wnc5r2ueh7ck6q93dj32dlqnls087fxdwk8qakdyafkq3yap9us6v52vjjsrvywa6rt52cm9r9zqt8r2t7mlcwspyetp5h2tztugp9lfyql";
    const VECTOR_HASH: &str = "0001020304050607080900010203040506070809000102030405060708090102";

    #[test]
    fn test_invoice_fields() {
        let invoice = Invoice::from_str(COFFEE_INVOICE).unwrap();
        assert_eq!(invoice.payment_hash(), VECTOR_HASH);
        assert_eq!(invoice.amount_msats().unwrap(), 250_000_000);
        assert_eq!(invoice.to_string(), COFFEE_INVOICE);
    }

    #[test]
    fn test_ensure_matches() {
        let invoice = Invoice::from_str(COFFEE_INVOICE).unwrap();
        assert!(invoice.ensure_matches(VECTOR_HASH, 250_000).is_ok());
        assert!(invoice.ensure_matches(&VECTOR_HASH.to_uppercase(), 250_000).is_ok());

        assert!(invoice.ensure_matches(&"ab".repeat(32), 250_000).is_err());
        assert!(invoice.ensure_matches(VECTOR_HASH, 250_001).is_err());
        assert!(invoice.ensure_matches(VECTOR_HASH, -1).is_err());

        let amountless = Invoice::from_str(DONATION_INVOICE).unwrap();
        assert_eq!(amountless.payment_hash(), VECTOR_HASH);
        assert!(amountless.amount_msats().is_err());
        assert!(amountless.ensure_matches(VECTOR_HASH, 250_000).is_err());
    }

    #[test]
    fn test_invalid_invoice_rejected() {
        assert!(Invoice::from_str("not-an-invoice").is_err());
        assert!(Invoice::from_str("").is_err());
    }

    #[tokio::test]
    async fn test_mock_issuer_unique_hashes() {
        let extra = serde_json::json!({"tag": "test"});
        let a = MockIssuer
            .create_invoice("wallet", 500, "memo", &extra)
            .await
            .unwrap();
        let b = MockIssuer
            .create_invoice("wallet", 500, "memo", &extra)
            .await
            .unwrap();

        assert_eq!(a.payment_hash.len(), 64);
        assert_ne!(a.payment_hash, b.payment_hash);
        assert!(a.bolt11.starts_with("lnbcrt5000n1"));
    }

    #[tokio::test]
    async fn test_mock_issuer_rejects_zero() {
        let extra = serde_json::json!({});
        let result = MockIssuer.create_invoice("wallet", 0, "memo", &extra).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_issuer_selection() {
        let config = Config::parse_from(["bitsatcredit-server"]);
        assert!(issuer_from_config(&config).is_ok());

        let config =
            Config::parse_from(["bitsatcredit-server", "--lnbits-url", "http://localhost:5000"]);
        assert!(issuer_from_config(&config).is_err());

        let config = Config::parse_from([
            "bitsatcredit-server",
            "--lnbits-url",
            "http://localhost:5000",
            "--lnbits-invoice-key",
            "key",
        ]);
        assert!(issuer_from_config(&config).is_ok());
    }
}
