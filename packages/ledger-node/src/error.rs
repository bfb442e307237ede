//! HTTP error mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use exit_ledger::{LedgerError, SourceError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Ledger(err) => ledger_status(err),
            ApiError::Source(SourceError::CursorAhead { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Source(SourceError::CursorPruned { .. }) => StatusCode::GONE,
            ApiError::Source(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Ledger(err) => err.code(),
            ApiError::Source(SourceError::CursorAhead { .. }) => "CursorAhead",
            ApiError::Source(SourceError::CursorPruned { .. }) => "CursorPruned",
            ApiError::Source(_) => "SourceUnavailable",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::NotFound(_) => "NotFound",
            ApiError::Unauthorized(_) => "Unauthorized",
        }
    }
}

fn ledger_status(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::AlreadyClaimed | LedgerError::WrappedTokenAlreadyRegistered { .. } => {
            StatusCode::CONFLICT
        }
        LedgerError::LeafIndexOutOfRange { .. } => StatusCode::NOT_FOUND,
        LedgerError::ProofHistoryUnavailable => StatusCode::GONE,
        LedgerError::OnlyAggregatorAuthority | LedgerError::OnlyReplica => StatusCode::FORBIDDEN,
        LedgerError::OnlyNotEmergencyState
        | LedgerError::OnlyEmergencyState
        | LedgerError::MerkleTreeFull => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::MessageFailed { .. } | LedgerError::TransferFailed { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
