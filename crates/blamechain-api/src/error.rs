//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use blamechain_core::Error as LedgerError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error(transparent)]
  Ledger(#[from] LedgerError),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::Ledger(e) => match e {
        LedgerError::UnknownSourceKind(_) => StatusCode::BAD_REQUEST,
        LedgerError::RecordNotFound(_)
        | LedgerError::ChainNotFound(_)
        | LedgerError::BundleNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::ConcurrentEditConflict { .. }
        | LedgerError::InvalidDisputeTransition { .. }
        | LedgerError::VersionOverflow(_) => StatusCode::CONFLICT,
        LedgerError::ChainIntegrityViolation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::HashAlgorithmMismatch { .. }
        | LedgerError::Serialization(_)
        | LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
