//! [`Ledger`]: the append, verification, and evidence engine.
//!
//! The ledger wraps a [`LedgerStore`] and owns the algorithms; the store only
//! persists what it is given. Appends to one key are linearised twice over:
//! by an in-process per-key lock, and by the store's conditional commit on the
//! chain tip read at the start of the attempt. A lost race is retried with a
//! fresh read up to [`LedgerConfig::max_append_attempts`] times.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  evidence::{
    DisputeStatus, EVIDENCE_FORMAT_VERSION, EvidenceBundle, EvidenceSnapshot,
    RevisionFlag, Verdict,
  },
  hashing::{GENESIS, HashAlgorithm},
  locks::KeyLocks,
  revision::{NewEdit, Revision, RevisionContent},
  source::RecordKey,
  store::{AppendCommit, CommitOutcome, LedgerStore, TransitionOutcome},
  verify::{ChainReport, verify_chain},
};

/// `edit_reason` recorded on a version 1 synthesized from pre-existing content.
pub const BOOTSTRAP_REASON: &str = "original content captured at first edit";

// ─── Configuration ───────────────────────────────────────────────────────────

/// Tunables for a [`Ledger`], deserialised from the `[ledger]` config table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
  /// Digest used for new revisions and expected on stored ones.
  pub hash_algorithm:      HashAlgorithm,
  /// Total commit attempts per append before surfacing a conflict.
  pub max_append_attempts: u32,
}

impl Default for LedgerConfig {
  fn default() -> Self {
    Self {
      hash_algorithm:      HashAlgorithm::default(),
      max_append_attempts: 5,
    }
  }
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

/// The revision ledger over a storage backend.
pub struct Ledger<S> {
  store:  Arc<S>,
  config: LedgerConfig,
  locks:  KeyLocks,
}

impl<S: LedgerStore> Ledger<S> {
  pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
    Self { store, config, locks: KeyLocks::default() }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn config(&self) -> &LedgerConfig { &self.config }

  // ── Append ────────────────────────────────────────────────────────────

  /// Record `edit` as the next revision of its record and update the live
  /// content to match.
  ///
  /// If the record has no chain yet, its current live content is first
  /// captured as version 1 (no editor), so the first edit always produces two
  /// revisions. Returns the revision holding `edit.content`.
  pub async fn append(&self, edit: NewEdit) -> Result<Revision> {
    let _guard = self.locks.acquire(edit.key).await;
    let attempts = self.config.max_append_attempts.max(1);

    for attempt in 1..=attempts {
      if let Some(revision) = self.try_append(&edit).await? {
        info!(
          key = %edit.key,
          version = revision.version_number,
          chain_hash = %revision.chain_hash,
          "appended revision"
        );
        return Ok(revision);
      }
      warn!(key = %edit.key, attempt, "chain tip moved during append; retrying");
    }

    Err(Error::ConcurrentEditConflict { key: edit.key, attempts })
  }

  /// One read-link-commit attempt. `Ok(None)` means the tip moved.
  async fn try_append(&self, edit: &NewEdit) -> Result<Option<Revision>> {
    let algorithm = self.config.hash_algorithm;
    let key = edit.key;
    let now = Utc::now();

    let latest = self
      .store
      .latest_revision(key)
      .await
      .map_err(Error::storage)?;

    let (expected_tip, mut revisions) = match latest {
      Some(latest) => {
        if latest.hash_algorithm != algorithm {
          self.ensure_chain_algorithm(&latest).await?;
        }
        (Some(latest.tip()), Vec::with_capacity(1))
      }
      None => {
        let original = self
          .store
          .read_content(key)
          .await
          .map_err(Error::storage)?
          .ok_or(Error::RecordNotFound(key))?;

        debug!(%key, "bootstrapping chain from live content");
        let genesis = Revision::link(
          algorithm,
          key,
          None,
          RevisionContent {
            content:     original,
            editor_id:   None,
            edit_reason: Some(BOOTSTRAP_REASON.to_owned()),
          },
          now,
        )?;
        (None, vec![genesis])
      }
    };

    let previous = revisions
      .last()
      .map(Revision::tip)
      .or_else(|| expected_tip.clone());
    let revision = Revision::link(
      algorithm,
      key,
      previous.as_ref(),
      edit.revision_content(),
      now,
    )?;
    revisions.push(revision.clone());

    let commit = AppendCommit {
      key,
      expected_tip,
      revisions,
      content: edit.content.clone(),
    };

    match self.store.commit_append(commit).await.map_err(Error::storage)? {
      CommitOutcome::Committed => Ok(Some(revision)),
      CommitOutcome::Conflict => Ok(None),
      CommitOutcome::RecordMissing => Err(Error::RecordNotFound(key)),
    }
  }

  /// Called when the tip was written with a digest other than the configured
  /// one. If the chain started under that digest too, the ledger is
  /// misconfigured. Otherwise only the tip is foreign, which verification
  /// reports as a divergence, so the append goes ahead.
  async fn ensure_chain_algorithm(&self, latest: &Revision) -> Result<()> {
    let first = if latest.is_genesis() {
      Some(latest.clone())
    } else {
      self
        .store
        .revision(latest.key, 1)
        .await
        .map_err(Error::storage)?
    };

    match first {
      Some(first) if first.hash_algorithm != self.config.hash_algorithm => {
        Err(Error::HashAlgorithmMismatch {
          key:        latest.key,
          version:    latest.version_number,
          stored:     latest.hash_algorithm,
          configured: self.config.hash_algorithm,
        })
      }
      _ => Ok(()),
    }
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Every revision of `key`, in version order. Empty if the record was never
  /// brought under ledger management.
  pub async fn history(&self, key: RecordKey) -> Result<Vec<Revision>> {
    self.store.revisions(key).await.map_err(Error::storage)
  }

  pub async fn revision(
    &self,
    key: RecordKey,
    version_number: u32,
  ) -> Result<Option<Revision>> {
    self
      .store
      .revision(key, version_number)
      .await
      .map_err(Error::storage)
  }

  // ── Verification ──────────────────────────────────────────────────────

  /// Recompute the chain of `key` from scratch.
  ///
  /// An altered chain is not an error here: the report carries
  /// `chain_valid = false` and the divergence point. Use
  /// [`ChainReport::ensure_intact`] to turn that into an error.
  pub async fn verify(&self, key: RecordKey) -> Result<ChainReport> {
    let revisions = self.history(key).await?;
    let report = verify_chain(self.config.hash_algorithm, key, &revisions)?;

    if let Some(version) = report.divergence_point {
      warn!(%key, divergence_point = version, "chain failed verification");
    } else {
      debug!(%key, length = report.length, "chain verified");
    }
    Ok(report)
  }

  // ── Evidence ──────────────────────────────────────────────────────────

  /// Snapshot the chain of `key` with a fresh verification report and store
  /// it as a new `Open` bundle.
  pub async fn export_evidence(
    &self,
    key: RecordKey,
    reason: impl Into<String>,
  ) -> Result<EvidenceBundle> {
    let revisions = self.history(key).await?;
    let verification =
      verify_chain(self.config.hash_algorithm, key, &revisions)?;

    let snapshot = EvidenceSnapshot {
      format_version: EVIDENCE_FORMAT_VERSION,
      key,
      reason: reason.into(),
      exported_at: Utc::now(),
      hash_algorithm: self.config.hash_algorithm,
      genesis: GENESIS.to_owned(),
      revisions,
      verification,
    };
    let bundle = EvidenceBundle::open(snapshot)?;

    self
      .store
      .insert_bundle(bundle.clone())
      .await
      .map_err(Error::storage)?;

    info!(
      %key,
      bundle_id = %bundle.bundle_id,
      chain_valid = bundle.snapshot.verification.chain_valid,
      "exported evidence bundle"
    );
    Ok(bundle)
  }

  pub async fn get_bundle(&self, bundle_id: Uuid) -> Result<EvidenceBundle> {
    self
      .store
      .get_bundle(bundle_id)
      .await
      .map_err(Error::storage)?
      .ok_or(Error::BundleNotFound(bundle_id))
  }

  /// Mark every revision captured in the bundle as disputed by it.
  /// Idempotent; writes flag records only.
  pub async fn flag(&self, bundle_id: Uuid) -> Result<Vec<RevisionFlag>> {
    let bundle = self.get_bundle(bundle_id).await?;
    let versions = bundle
      .snapshot
      .revisions
      .iter()
      .map(|r| r.version_number)
      .collect();

    let flags = self
      .store
      .flag_revisions(bundle_id, bundle.key(), versions, Utc::now())
      .await
      .map_err(Error::storage)?;

    info!(%bundle_id, key = %bundle.key(), flagged = flags.len(), "flagged revisions");
    Ok(flags)
  }

  pub async fn flags(&self, key: RecordKey) -> Result<Vec<RevisionFlag>> {
    self.store.revision_flags(key).await.map_err(Error::storage)
  }

  /// `open → under_review`.
  pub async fn begin_review(&self, bundle_id: Uuid) -> Result<EvidenceBundle> {
    self
      .transition(bundle_id, DisputeStatus::UnderReview, None)
      .await
  }

  /// `under_review → upheld | overturned`. Recorded on the bundle only.
  pub async fn resolve(
    &self,
    bundle_id: Uuid,
    verdict: Verdict,
    notes: Option<String>,
  ) -> Result<EvidenceBundle> {
    self.transition(bundle_id, verdict.into(), notes).await
  }

  async fn transition(
    &self,
    bundle_id: Uuid,
    to: DisputeStatus,
    notes: Option<String>,
  ) -> Result<EvidenceBundle> {
    let from = self.get_bundle(bundle_id).await?.status;
    if !from.can_transition_to(to) {
      return Err(Error::InvalidDisputeTransition { bundle_id, from, to });
    }

    let outcome = self
      .store
      .transition_bundle(bundle_id, from, to, Utc::now(), notes)
      .await
      .map_err(Error::storage)?;

    match outcome {
      TransitionOutcome::Applied(bundle) => {
        info!(%bundle_id, %from, %to, "dispute status changed");
        Ok(bundle)
      }
      TransitionOutcome::StatusChanged(actual) => {
        Err(Error::InvalidDisputeTransition { bundle_id, from: actual, to })
      }
      TransitionOutcome::NotFound => Err(Error::BundleNotFound(bundle_id)),
    }
  }
}
