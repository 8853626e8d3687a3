//! Handlers for a record's revision chain.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/records/{kind}/{id}/revisions` | Full history, oldest first |
//! | `POST` | `/records/{kind}/{id}/revisions` | Body: [`EditBody`]; returns 201 + the new revision |
//! | `GET`  | `/records/{kind}/{id}/revisions/{version}` | Single revision |
//! | `GET`  | `/records/{kind}/{id}/verify` | Optional `?strict=true` turns a broken chain into 422 |
//! | `GET`  | `/records/{kind}/{id}/flags` | Dispute flags on this record's revisions |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use blamechain_core::{
  evidence::RevisionFlag,
  ledger::Ledger,
  revision::{NewEdit, Revision},
  store::LedgerStore,
  verify::ChainReport,
};
use serde::Deserialize;

use crate::{error::ApiError, records::record_key};

// ─── History ──────────────────────────────────────────────────────────────────

/// `GET /records/{kind}/{id}/revisions`
pub async fn list<S: LedgerStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  Path((kind, id)): Path<(String, i64)>,
) -> Result<Json<Vec<Revision>>, ApiError> {
  let key = record_key(&kind, id)?;
  Ok(Json(ledger.history(key).await?))
}

/// `GET /records/{kind}/{id}/revisions/{version}`
pub async fn get_one<S: LedgerStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  Path((kind, id, version)): Path<(String, i64, u32)>,
) -> Result<Json<Revision>, ApiError> {
  let key = record_key(&kind, id)?;
  let revision = ledger
    .revision(key, version)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("revision {version} of {key} not found")))?;
  Ok(Json(revision))
}

// ─── Append ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /records/{kind}/{id}/revisions`.
#[derive(Debug, Deserialize)]
pub struct EditBody {
  pub content:     String,
  pub editor_id:   Option<String>,
  pub edit_reason: Option<String>,
}

/// `POST /records/{kind}/{id}/revisions`
pub async fn append<S: LedgerStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  Path((kind, id)): Path<(String, i64)>,
  Json(body): Json<EditBody>,
) -> Result<impl IntoResponse, ApiError> {
  let key = record_key(&kind, id)?;
  let edit = NewEdit {
    key,
    content: body.content,
    editor_id: body.editor_id,
    edit_reason: body.edit_reason,
  };
  let revision = ledger.append(edit).await?;
  Ok((StatusCode::CREATED, Json(revision)))
}

// ─── Verify ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
  /// Reject a broken chain with 422 instead of returning the report.
  #[serde(default)]
  pub strict: bool,
}

/// `GET /records/{kind}/{id}/verify[?strict=true]`
pub async fn verify<S: LedgerStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  Path((kind, id)): Path<(String, i64)>,
  Query(params): Query<VerifyParams>,
) -> Result<Json<ChainReport>, ApiError> {
  let key = record_key(&kind, id)?;
  let mut report = ledger.verify(key).await?;
  if params.strict {
    report = report.ensure_intact()?;
  }
  Ok(Json(report))
}

/// `GET /records/{kind}/{id}/flags`
pub async fn flags<S: LedgerStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  Path((kind, id)): Path<(String, i64)>,
) -> Result<Json<Vec<RevisionFlag>>, ApiError> {
  let key = record_key(&kind, id)?;
  Ok(Json(ledger.flags(key).await?))
}
