//! Ledger rules on top of the store: balance mutations, the top-up flow and
//! extension-wide settings.
//!
//! Every operation that touches more than one row runs inside a single
//! `sqlx::Transaction` whose first statement is a write. SQLite then hands out
//! its write lock in order, so concurrent mutations of one npub serialize and
//! no delta is lost. A transaction dropped before `commit` rolls back, which
//! keeps balance, history and invoice state consistent even if the calling
//! task is cancelled.

pub mod balance;
pub mod settings;
pub mod topup;

use crate::error::{LedgerError, Result};

pub(crate) fn validate_npub(npub: &str) -> Result<()> {
    if npub.trim().is_empty() {
        return Err(LedgerError::invalid("npub must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_amount(amount_sats: i64) -> Result<()> {
    if amount_sats < 1 {
        return Err(LedgerError::invalid("Amount must be at least 1 sat"));
    }
    Ok(())
}

/// Leading characters of an npub, for memos and log lines.
pub(crate) fn short_npub(npub: &str) -> String {
    npub.chars().take(16).collect()
}
