use crate::config::ConfigError;
use crate::ledger::LedgerError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Classified failure kinds surfaced to callers alongside the raw message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// A required address or collaborator is missing.
    NotConfigured,
    /// Unknown collateral branch / market key.
    BranchNotFound,
    /// Coverage below the requested amount. Carried as data on quotes.
    InsufficientLiquidity,
    /// Allowance still short after the approval step.
    AllowanceInsufficient,
    /// Collaborator call failed or timed out.
    NetworkError,
    /// The signer declined.
    UserRejected,
    /// Order record failed validation. Counted, never surfaced per order.
    MalformedOrder,
    PositionNotFound,
    /// Non-positive or unrepresentable amount in a write request.
    InvalidAmount,
    /// Transaction mined but reverted.
    Reverted,
    /// Caller cancelled before the main transaction was broadcast.
    Cancelled,
    /// Cancellation requested after broadcast.
    AlreadySubmitted,
}

impl ErrorKind {
    pub fn from_ledger(err: &LedgerError) -> ErrorKind {
        match err {
            LedgerError::BranchNotFound(_) => ErrorKind::BranchNotFound,
            LedgerError::NotConfigured(_) => ErrorKind::NotConfigured,
            LedgerError::NetworkError(_)
            | LedgerError::HttpError { .. }
            | LedgerError::ParseError(_)
            | LedgerError::RateLimited
            | LedgerError::Unavailable(_) => ErrorKind::NetworkError,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Upstream error: {0}")]
    Upstream(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match ErrorKind::from_ledger(&err) {
            ErrorKind::BranchNotFound => AppError::NotFound(err.to_string()),
            ErrorKind::NotConfigured => AppError::Config(err.to_string()),
            _ => AppError::Upstream(err.to_string()),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::BranchNotFound(_) => AppError::NotFound(err.to_string()),
            other => AppError::Config(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Config(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
