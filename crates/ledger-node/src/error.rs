use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ledger_core::LedgerError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("a block is already being mined on this node")]
    MiningInProgress,
    #[error("blocking worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Ledger(LedgerError::RejectedBlock(_)) => StatusCode::CONFLICT,
            ApiError::Ledger(LedgerError::StaleTip { .. }) => StatusCode::CONFLICT,
            ApiError::Ledger(LedgerError::EmptyChain) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::MiningInProgress => StatusCode::CONFLICT,
            ApiError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{self}");
        }
        (status, Json(json!({ "note": self.to_string() }))).into_response()
    }
}
