use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Url;

pub const WEBHOOK_PATH: &str = "/api/v1/payments/webhook";

#[derive(Parser, Debug, Clone)]
#[command(name = "bitsatcredit-server")]
#[command(about = "Prepaid sat credit ledger for BitSatRelay users")]
#[command(version)]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://bitsatcredit.db")]
    pub database_url: String,

    /// Maximum number of pooled database connections
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value = "10")]
    pub max_connections: u32,

    /// Secret expected in the X-Api-Key header on admin routes
    #[arg(long, env = "ADMIN_API_KEY")]
    pub admin_api_key: Option<String>,

    /// Wallet that receives top-ups when the request names none. Only the mock
    /// issuer needs it; LNbits invoices go to the wallet of the invoice key
    /// and fall back to the label "lnbits"
    #[arg(long, env = "DEFAULT_WALLET_ID")]
    pub default_wallet_id: Option<String>,

    /// LNbits base URL (e.g., "https://lnbits.example.com")
    #[arg(long, env = "LNBITS_URL")]
    pub lnbits_url: Option<String>,

    /// LNbits wallet invoice key
    #[arg(long, env = "LNBITS_INVOICE_KEY")]
    pub lnbits_invoice_key: Option<String>,

    /// Public base URL of this server, used to register the payment webhook
    #[arg(long, env = "PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Shared secret carried as `?key=` in the registered payment webhook URL
    #[arg(long, env = "WEBHOOK_SECRET")]
    pub webhook_secret: Option<String>,

    /// Capacity of the payment event queue
    #[arg(long, env = "EVENT_QUEUE_CAPACITY", default_value = "1024")]
    pub event_queue_capacity: usize,
}

impl Config {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// URL the host posts settled payments to. The host sends no custom
    /// headers, so the webhook secret travels in the query string. Without a
    /// public URL or a secret no webhook is registered.
    pub fn webhook_url(&self) -> Result<Option<String>> {
        let (Some(base), Some(secret)) =
            (self.public_url.as_deref(), self.webhook_secret.as_deref())
        else {
            return Ok(None);
        };

        let mut url = Url::parse(&format!("{}{}", base.trim_end_matches('/'), WEBHOOK_PATH))
            .with_context(|| format!("Invalid public URL: {}", base))?;
        url.query_pairs_mut().append_pair("key", secret);

        Ok(Some(url.to_string()))
    }

    pub fn issuer_kind(&self) -> &'static str {
        if self.lnbits_url.is_some() && self.lnbits_invoice_key.is_some() {
            "lnbits"
        } else {
            "mock"
        }
    }
}
