//! Handlers for the live record at `/records/{kind}/{id}`.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `PUT`    | `/records/{kind}/{id}` | Body: `{"content":"..."}`; 201, or 409 if it exists or has a chain |
//! | `GET`    | `/records/{kind}/{id}` | Current content |
//! | `DELETE` | `/records/{kind}/{id}` | 204; the revision chain is retained |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use blamechain_core::{
  Error as LedgerError,
  ledger::Ledger,
  source::{RecordKey, SourceKind},
  store::{ContentStore, LedgerStore},
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Parse the `{kind}/{id}` path segments shared by every record route.
pub(crate) fn record_key(kind: &str, id: i64) -> Result<RecordKey, ApiError> {
  let kind: SourceKind = kind.parse()?;
  Ok(RecordKey::new(kind, id))
}

/// A live record as returned by `GET` and `PUT`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Record {
  #[serde(flatten)]
  pub key:     RecordKey,
  pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ContentBody {
  pub content: String,
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `PUT /records/{kind}/{id}`
pub async fn create<S: LedgerStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  Path((kind, id)): Path<(String, i64)>,
  Json(body): Json<ContentBody>,
) -> Result<impl IntoResponse, ApiError> {
  let key = record_key(&kind, id)?;
  let created = ledger
    .store()
    .create_record(key, body.content.clone())
    .await
    .map_err(LedgerError::storage)?;
  if !created {
    return Err(ApiError::Conflict(format!(
      "record {key} already exists or has recorded history"
    )));
  }
  Ok((StatusCode::CREATED, Json(Record { key, content: body.content })))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /records/{kind}/{id}`
pub async fn get_one<S: LedgerStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  Path((kind, id)): Path<(String, i64)>,
) -> Result<Json<Record>, ApiError> {
  let key = record_key(&kind, id)?;
  let content = ledger
    .store()
    .read_content(key)
    .await
    .map_err(LedgerError::storage)?
    .ok_or(LedgerError::RecordNotFound(key))?;
  Ok(Json(Record { key, content }))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /records/{kind}/{id}`
pub async fn delete_one<S: LedgerStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  Path((kind, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
  let key = record_key(&kind, id)?;
  let deleted = ledger
    .store()
    .delete_record(key)
    .await
    .map_err(LedgerError::storage)?;
  if !deleted {
    return Err(ApiError::NotFound(format!("record {key} not found")));
  }
  Ok(StatusCode::NO_CONTENT)
}
