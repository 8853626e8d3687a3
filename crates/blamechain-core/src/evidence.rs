//! Evidence bundles and the dispute lifecycle.
//!
//! A bundle is a frozen snapshot of a chain plus its verification report,
//! handed to an external arbitration process. It is metadata about the chain;
//! it is never linked into the chain itself. The only mutable part of a
//! bundle is its dispute status, which the arbitration consumer drives.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Result,
  hashing::{self, HashAlgorithm},
  revision::Revision,
  source::RecordKey,
  verify::ChainReport,
};

/// Version of the [`EvidenceSnapshot`] layout.
pub const EVIDENCE_FORMAT_VERSION: u32 = 1;

// ─── Dispute status ──────────────────────────────────────────────────────────

/// Where a dispute case stands.
///
/// ```text
/// open ──▶ under_review ──▶ upheld
///                      └──▶ overturned
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
  Open,
  UnderReview,
  Upheld,
  Overturned,
}

impl DisputeStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Upheld | Self::Overturned)
  }

  pub fn can_transition_to(self, to: Self) -> bool {
    matches!(
      (self, to),
      (Self::Open, Self::UnderReview)
        | (Self::UnderReview, Self::Upheld)
        | (Self::UnderReview, Self::Overturned)
    )
  }

  /// The discriminant string stored in the `status` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Open => "open",
      Self::UnderReview => "under_review",
      Self::Upheld => "upheld",
      Self::Overturned => "overturned",
    }
  }

  pub fn from_id(s: &str) -> Option<Self> {
    match s {
      "open" => Some(Self::Open),
      "under_review" => Some(Self::UnderReview),
      "upheld" => Some(Self::Upheld),
      "overturned" => Some(Self::Overturned),
      _ => None,
    }
  }
}

impl fmt::Display for DisputeStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The arbitration outcome recorded by [`crate::ledger::Ledger::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
  Upheld,
  Overturned,
}

impl From<Verdict> for DisputeStatus {
  fn from(v: Verdict) -> Self {
    match v {
      Verdict::Upheld => Self::Upheld,
      Verdict::Overturned => Self::Overturned,
    }
  }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// The immutable body of a bundle. Self-describing: it names the digest
/// algorithm and genesis sentinel needed to re-verify `revisions` offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSnapshot {
  pub format_version: u32,
  pub key:            RecordKey,
  /// Caller-supplied reason the evidence was requested.
  pub reason:         String,
  pub exported_at:    DateTime<Utc>,
  pub hash_algorithm: HashAlgorithm,
  pub genesis:        String,
  /// Every revision of the chain, in version order.
  pub revisions:      Vec<Revision>,
  pub verification:   ChainReport,
}

impl EvidenceSnapshot {
  /// Digest over the canonical JSON encoding of the snapshot.
  pub fn digest(&self) -> Result<String> {
    let bytes = serde_json::to_string(self)?;
    Ok(hashing::content_hash(self.hash_algorithm, &bytes))
  }
}

// ─── Bundle ──────────────────────────────────────────────────────────────────

/// A persisted evidence bundle and the state of its dispute case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceBundle {
  pub bundle_id:         Uuid,
  pub snapshot:          EvidenceSnapshot,
  /// [`EvidenceSnapshot::digest`] at export time.
  pub snapshot_digest:   String,
  pub status:            DisputeStatus,
  pub status_changed_at: DateTime<Utc>,
  /// Notes supplied with the verdict, if resolved.
  pub resolution_notes:  Option<String>,
}

impl EvidenceBundle {
  /// Seal `snapshot` into a new, `Open` bundle.
  pub fn open(snapshot: EvidenceSnapshot) -> Result<Self> {
    let snapshot_digest = snapshot.digest()?;
    Ok(Self {
      bundle_id: Uuid::new_v4(),
      status_changed_at: snapshot.exported_at,
      snapshot,
      snapshot_digest,
      status: DisputeStatus::Open,
      resolution_notes: None,
    })
  }

  /// Whether the snapshot still matches the digest taken at export.
  pub fn digest_matches(&self) -> Result<bool> {
    Ok(hashing::digests_match(
      &self.snapshot.digest()?,
      &self.snapshot_digest,
    ))
  }

  pub fn key(&self) -> RecordKey { self.snapshot.key }
}

// ─── Flags ───────────────────────────────────────────────────────────────────

/// Marks a single revision as part of a dispute case. Stored apart from the
/// revision so the revision itself is never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionFlag {
  pub key:            RecordKey,
  pub version_number: u32,
  pub bundle_id:      Uuid,
  pub flagged_at:     DateTime<Utc>,
}
