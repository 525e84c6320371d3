//! Invoice issuer backed by an LNbits instance.

use std::{str::FromStr, time::Duration};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Invoice, InvoiceIssuer, IssuedInvoice};

#[derive(Debug, Serialize)]
struct CreateInvoiceRequest<'a> {
    out: bool,
    amount: i64,
    unit: &'static str,
    memo: &'a str,
    extra: &'a serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CreateInvoiceResponse {
    payment_hash: String,
    #[serde(default)]
    bolt11: Option<String>,
    // Older LNbits releases only send `payment_request`
    #[serde(default)]
    payment_request: Option<String>,
}

impl CreateInvoiceResponse {
    fn bolt11(&self) -> Option<&str> {
        self.bolt11.as_deref().or(self.payment_request.as_deref())
    }

    /// Decode the returned bolt11 and make sure it is the invoice we asked
    /// for. The payment hash becomes the settlement key, so it is taken from
    /// the invoice itself.
    fn into_issued(self, amount_sats: i64) -> Result<IssuedInvoice> {
        let bolt11 = self
            .bolt11()
            .ok_or_else(|| anyhow!("LNbits response carries no invoice"))?;
        let invoice = Invoice::from_str(bolt11)?;
        invoice.ensure_matches(&self.payment_hash, amount_sats)?;

        Ok(IssuedInvoice {
            payment_hash: invoice.payment_hash(),
            bolt11: bolt11.to_string(),
        })
    }
}

/// Talks to `POST /api/v1/payments` with a wallet invoice key.
///
/// The invoice key already pins the wallet, so `wallet_id` is informational.
pub struct LnbitsIssuer {
    http: Client,
    base_url: String,
    invoice_key: String,
    webhook_url: Option<String>,
}

impl LnbitsIssuer {
    pub fn new(base_url: &str, invoice_key: &str, webhook_url: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            invoice_key: invoice_key.to_string(),
            webhook_url,
        })
    }

    fn payments_url(&self) -> String {
        format!("{}/api/v1/payments", self.base_url)
    }
}

#[async_trait]
impl InvoiceIssuer for LnbitsIssuer {
    async fn create_invoice(
        &self,
        wallet_id: &str,
        amount_sats: i64,
        memo: &str,
        extra: &serde_json::Value,
    ) -> Result<IssuedInvoice> {
        let body = CreateInvoiceRequest {
            out: false,
            amount: amount_sats,
            unit: "sat",
            memo,
            extra,
            webhook: self.webhook_url.as_deref(),
        };

        tracing::debug!(wallet_id, amount_sats, "requesting invoice from LNbits");

        let resp = self
            .http
            .post(self.payments_url())
            .header("X-Api-Key", &self.invoice_key)
            .json(&body)
            .send()
            .await
            .context("LNbits request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("LNbits returned {}: {}", status, text));
        }

        let created: CreateInvoiceResponse = resp
            .json()
            .await
            .context("Unexpected LNbits invoice response")?;

        created.into_issued(amount_sats)
    }
}
