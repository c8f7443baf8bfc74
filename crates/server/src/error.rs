//! Unified error handling for the ledger service.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use parcel_ledger_core::ledger::LedgerError;
use parcel_ledger_core::shipment::TransitionError;
use parcel_ledger_core::withdrawal::WithdrawalError;

use crate::db::RepositoryError;
use crate::services::payment_gateway::GatewayError;

/// Application-level error type for every mutating and reading operation.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(RepositoryError),

    /// Shipment, order, wallet, or request absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Guard violated; state unchanged.
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Uniqueness rule or concurrent modification.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Payment gateway failure that had no fallback.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Body of an error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

impl AppError {
    /// Stable machine-readable kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::InsufficientBalance(_) => "INSUFFICIENT_BALANCE",
            Self::Conflict(_) => "CONFLICT",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Gateway(_) => "GATEWAY",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidStateTransition(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidAmount(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientBalance(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    pub(crate) fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound("record".to_string()),
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Database(other),
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        Self::InvalidStateTransition(err.to_string())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidAmount(_) => Self::InvalidAmount(err.to_string()),
            LedgerError::InsufficientBalance { .. } | LedgerError::InsufficientPending { .. } => {
                Self::InsufficientBalance(err.to_string())
            }
            LedgerError::UnsupportedType(_) => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<WithdrawalError> for AppError {
    fn from(err: WithdrawalError) -> Self {
        match err {
            WithdrawalError::InvalidStateTransition { .. } => {
                Self::InvalidStateTransition(err.to_string())
            }
            WithdrawalError::AlreadyOpen => Self::Conflict(err.to_string()),
            WithdrawalError::Ledger(inner) => inner.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log server errors with Sentry
        if matches!(
            self,
            Self::Database(_) | Self::Internal(_) | Self::Gateway(_)
        ) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Ledger request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Gateway(_) => "External service error".to_string(),
            _ => self.to_string(),
        };

        let body = ErrorBody {
            kind: self.kind(),
            message,
        };
        (self.status(), Json(body)).into_response()
    }
}
