//! Error types for `blamechain-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::{
  evidence::DisputeStatus,
  hashing::HashAlgorithm,
  source::RecordKey,
};

#[derive(Debug, Error)]
pub enum Error {
  /// No live content and no revisions: nothing to bootstrap from.
  #[error("record not found: {0}")]
  RecordNotFound(RecordKey),

  /// The record was never brought under ledger management.
  #[error("no revisions recorded for {0}")]
  ChainNotFound(RecordKey),

  #[error("unknown source kind: {0:?}")]
  UnknownSourceKind(String),

  #[error("concurrent edit conflict on {key} after {attempts} attempts; retry the edit")]
  ConcurrentEditConflict { key: RecordKey, attempts: u32 },

  #[error("chain integrity violation on {key}: diverges at version {divergence_point}")]
  ChainIntegrityViolation {
    key:              RecordKey,
    divergence_point: u32,
  },

  /// Stored revisions were written with a different digest than the one this
  /// deployment is configured for. A deployment error, not a tamper signal.
  #[error(
    "revision {version} of {key} was hashed with {stored}, but the ledger is configured for {configured}"
  )]
  HashAlgorithmMismatch {
    key:        RecordKey,
    version:    u32,
    stored:     HashAlgorithm,
    configured: HashAlgorithm,
  },

  /// The chain has used every representable version number.
  #[error("revision chain of {0} has no version numbers left")]
  VersionOverflow(RecordKey),

  #[error("evidence bundle not found: {0}")]
  BundleNotFound(Uuid),

  #[error("evidence bundle {bundle_id} cannot move from {from} to {to}")]
  InvalidDisputeTransition {
    bundle_id: Uuid,
    from:      DisputeStatus,
    to:        DisputeStatus,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("storage failure: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Box a backend error into [`Error::Storage`].
  pub fn storage<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Storage(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
