//! HTTP server for Blamechain.
//!
//! Mounts the ledger API from [`blamechain_api`] under `/api` behind HTTP
//! Basic auth, plus an unauthenticated `/health` check.

pub mod auth;
pub mod error;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Json, Router,
  extract::State,
  middleware,
  routing::get,
};
use blamechain_core::{
  ledger::{Ledger, LedgerConfig},
  store::LedgerStore,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use auth::{AuthConfig, require_auth};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `BLAMECHAIN_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  pub auth_username:      String,
  pub auth_password_hash: String,
  #[serde(default)]
  pub ledger:             LedgerConfig,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through the server's own handlers and middleware.
pub struct AppState<S> {
  pub ledger: Arc<Ledger<S>>,
  pub auth:   Arc<AuthConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      ledger: self.ledger.clone(),
      auth:   self.auth.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the top-level axum [`Router`].
pub fn router<S>(state: AppState<S>) -> Router
where
  S: LedgerStore + 'static,
{
  let api = blamechain_api::api_router(state.ledger.clone()).route_layer(
    middleware::from_fn_with_state(state.auth.clone(), require_auth),
  );

  Router::new()
    .route("/health", get(health::<S>))
    .with_state(state)
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

/// `GET /health`
async fn health<S: LedgerStore>(State(state): State<AppState<S>>) -> Json<Value> {
  Json(json!({
    "status": "ok",
    "hash_algorithm": state.ledger.config().hash_algorithm,
  }))
}

#[cfg(test)]
mod tests {
  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
  };
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD as B64;
  use blamechain_store_sqlite::SqliteStore;
  use rand_core::OsRng;
  use tower::ServiceExt as _;

  use super::*;

  async fn make_state(password: &str) -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let salt  = SaltString::generate(&mut OsRng);
    let hash  = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .unwrap()
      .to_string();

    AppState {
      ledger: Arc::new(Ledger::new(Arc::new(store), LedgerConfig::default())),
      auth:   Arc::new(AuthConfig {
        username:      "user".to_string(),
        password_hash: hash,
      }),
    }
  }

  fn auth_header(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
  }

  async fn oneshot_raw(
    state:   AppState<SqliteStore>,
    method:  &str,
    uri:     &str,
    headers: Vec<(header::HeaderName, String)>,
    body:    &str,
  ) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
      builder = builder.header(k, v);
    }
    let req = builder.body(Body::from(body.to_string())).unwrap();
    router(state).oneshot(req).await.unwrap()
  }

  #[tokio::test]
  async fn health_needs_no_auth() {
    let state = make_state("secret").await;
    let resp = oneshot_raw(state, "GET", "/health", vec![], "").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["hash_algorithm"], "sha256");
  }

  #[tokio::test]
  async fn api_rejects_missing_credentials() {
    let state = make_state("secret").await;
    let resp = oneshot_raw(state, "GET", "/api/records/chat_message/1", vec![], "").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
  }

  #[tokio::test]
  async fn api_rejects_wrong_password() {
    let state = make_state("secret").await;
    let resp = oneshot_raw(
      state,
      "GET",
      "/api/records/chat_message/1",
      vec![(header::AUTHORIZATION, auth_header("user", "nope"))],
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn authenticated_edit_round_trip() {
    let state = make_state("secret").await;
    let creds = auth_header("user", "secret");
    let json_headers = || {
      vec![
        (header::AUTHORIZATION, creds.clone()),
        (header::CONTENT_TYPE, "application/json".to_string()),
      ]
    };

    let resp = oneshot_raw(
      state.clone(),
      "PUT",
      "/api/records/direct_message/3",
      json_headers(),
      r#"{"content":"hi"}"#,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = oneshot_raw(
      state.clone(),
      "POST",
      "/api/records/direct_message/3/revisions",
      json_headers(),
      r#"{"content":"hi there","editor_id":"alice"}"#,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = oneshot_raw(
      state,
      "GET",
      "/api/records/direct_message/3/verify",
      vec![(header::AUTHORIZATION, creds.clone())],
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let report: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(report["chain_valid"], true);
    assert_eq!(report["length"], 2);
  }
}
