//! JSON REST API for Blamechain.
//!
//! Exposes an axum [`Router`] backed by a [`Ledger`] over any
//! [`LedgerStore`]. Auth, TLS, and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", blamechain_api::api_router(ledger.clone()))
//! ```

pub mod error;
pub mod evidence;
pub mod records;
pub mod revisions;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use blamechain_core::{ledger::Ledger, store::LedgerStore};

pub use error::ApiError;

/// Build a fully-materialised API router for `ledger`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(ledger: Arc<Ledger<S>>) -> Router<()>
where
  S: LedgerStore + 'static,
{
  Router::new()
    // Live records
    .route(
      "/records/{kind}/{id}",
      put(records::create::<S>)
        .get(records::get_one::<S>)
        .delete(records::delete_one::<S>),
    )
    // Revision chain
    .route(
      "/records/{kind}/{id}/revisions",
      get(revisions::list::<S>).post(revisions::append::<S>),
    )
    .route(
      "/records/{kind}/{id}/revisions/{version}",
      get(revisions::get_one::<S>),
    )
    .route("/records/{kind}/{id}/verify", get(revisions::verify::<S>))
    .route("/records/{kind}/{id}/flags", get(revisions::flags::<S>))
    // Evidence
    .route("/records/{kind}/{id}/evidence", post(evidence::export::<S>))
    .route("/evidence/{bundle_id}", get(evidence::get_one::<S>))
    .route("/evidence/{bundle_id}/flag", post(evidence::flag::<S>))
    .route("/evidence/{bundle_id}/review", post(evidence::review::<S>))
    .route("/evidence/{bundle_id}/resolve", post(evidence::resolve::<S>))
    .with_state(ledger)
}
