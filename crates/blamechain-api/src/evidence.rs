//! Handlers for evidence bundles and their dispute lifecycle.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/records/{kind}/{id}/evidence` | Body: `{"reason":"..."}`; returns 201 + an `open` bundle |
//! | `GET`  | `/evidence/{bundle_id}` | |
//! | `POST` | `/evidence/{bundle_id}/flag` | Flags every captured revision; idempotent |
//! | `POST` | `/evidence/{bundle_id}/review` | `open` → `under_review` |
//! | `POST` | `/evidence/{bundle_id}/resolve` | Body: [`ResolveBody`] |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use blamechain_core::{
  evidence::{EvidenceBundle, RevisionFlag, Verdict},
  ledger::Ledger,
  store::LedgerStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::ApiError, records::record_key};

#[derive(Debug, Deserialize)]
pub struct ExportBody {
  pub reason: String,
}

/// `POST /records/{kind}/{id}/evidence`
pub async fn export<S: LedgerStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  Path((kind, id)): Path<(String, i64)>,
  Json(body): Json<ExportBody>,
) -> Result<impl IntoResponse, ApiError> {
  let key = record_key(&kind, id)?;
  let bundle = ledger.export_evidence(key, body.reason).await?;
  Ok((StatusCode::CREATED, Json(bundle)))
}

/// `GET /evidence/{bundle_id}`
pub async fn get_one<S: LedgerStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  Path(bundle_id): Path<Uuid>,
) -> Result<Json<EvidenceBundle>, ApiError> {
  Ok(Json(ledger.get_bundle(bundle_id).await?))
}

/// `POST /evidence/{bundle_id}/flag`
pub async fn flag<S: LedgerStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  Path(bundle_id): Path<Uuid>,
) -> Result<Json<Vec<RevisionFlag>>, ApiError> {
  Ok(Json(ledger.flag(bundle_id).await?))
}

/// `POST /evidence/{bundle_id}/review`
pub async fn review<S: LedgerStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  Path(bundle_id): Path<Uuid>,
) -> Result<Json<EvidenceBundle>, ApiError> {
  Ok(Json(ledger.begin_review(bundle_id).await?))
}

/// JSON body accepted by `POST /evidence/{bundle_id}/resolve`.
#[derive(Debug, Deserialize)]
pub struct ResolveBody {
  pub verdict: Verdict,
  pub notes:   Option<String>,
}

/// `POST /evidence/{bundle_id}/resolve`, body: `{"verdict":"upheld","notes":"..."}`
pub async fn resolve<S: LedgerStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  Path(bundle_id): Path<Uuid>,
  Json(body): Json<ResolveBody>,
) -> Result<Json<EvidenceBundle>, ApiError> {
  Ok(Json(ledger.resolve(bundle_id, body.verdict, body.notes).await?))
}
