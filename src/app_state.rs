use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::{config::Config, lightning::InvoiceIssuer, payments::PaymentEvent};

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<Sqlite>,
    pub config: Arc<Config>,
    pub lightning: Arc<dyn InvoiceIssuer>,
    /// Producer side of the payment queue drained by the listener.
    pub payments: mpsc::Sender<PaymentEvent>,
}
