use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use super::auth::WebhookKey;
use crate::{
    app_state::AppState,
    error::{LedgerError, Result},
    payments::PaymentEvent,
};

/// Payment object as posted by the host wallet.
#[derive(Debug, Deserialize)]
pub struct HostPayment {
    pub payment_hash: String,
    /// Millisatoshis.
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub extra: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub pending: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
}

impl HostPayment {
    fn is_settled(&self) -> bool {
        if self.pending == Some(true) {
            return false;
        }
        !matches!(self.status.as_deref(), Some("pending" | "failed"))
    }
}

impl From<HostPayment> for PaymentEvent {
    fn from(payment: HostPayment) -> Self {
        Self {
            payment_hash: payment.payment_hash,
            amount_msat: payment.amount,
            extra: payment.extra.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub queued: bool,
}

/// POST /api/v1/payments/webhook
///
/// Only enqueues; settlement happens on the payment listener. Waits for queue
/// capacity when the listener falls behind.
pub async fn payment_webhook(
    _key: WebhookKey,
    State(state): State<AppState>,
    Json(payment): Json<HostPayment>,
) -> Result<(StatusCode, Json<WebhookResponse>)> {
    if !payment.is_settled() {
        tracing::debug!(payment_hash = %payment.payment_hash, "ignoring unsettled payment");
        return Ok((StatusCode::OK, Json(WebhookResponse { queued: false })));
    }

    let event = PaymentEvent::from(payment);
    state.payments.send(event).await.map_err(|e| {
        tracing::error!(payment_hash = %e.0.payment_hash, "payment listener is not running");
        LedgerError::SystemOffline("Payment listener is not running".to_string())
    })?;

    Ok((StatusCode::ACCEPTED, Json(WebhookResponse { queued: true })))
}
