use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Errors raised by the ledger, the top-up flow and the HTTP layer.
///
/// Each variant maps onto one HTTP status. A duplicate settlement is not an
/// error: see [`crate::ledger::topup::SettleOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Insufficient balance. Have {have} sats, need {need} sats")]
    InsufficientBalance { have: i64, need: i64 },

    #[error("lightning backend error: {0}")]
    Lightning(String),

    #[error("{0}")]
    SystemOffline(String),

    #[error("missing or invalid admin key")]
    Unauthorized,

    #[error("admin access is not configured")]
    Forbidden,

    #[error("storage unavailable: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidArgument(_) => 1001,
            Self::Unauthorized => 1401,
            Self::Forbidden => 1403,
            Self::NotFound { .. } => 2001,
            Self::InsufficientBalance { .. } => 2002,
            Self::SystemOffline(_) => 2003,
            Self::Storage(_) => 3001,
            Self::Migration(_) => 3002,
            Self::Lightning(_) => 3003,
        }
    }

    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::SystemOffline(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Lightning(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) | Self::Migration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: u32,
    message: String,
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), "request failed: {}", self);
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}
