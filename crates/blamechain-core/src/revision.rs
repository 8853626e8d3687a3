//! A revision is one immutable link in a record's history chain.
//!
//! A revision is written once by the ledger and never updated or deleted. The
//! live content held by the content store is only a cache of the latest
//! revision's `content`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  hashing::{self, GENESIS, HashAlgorithm},
  source::RecordKey,
};

// ─── Revision ────────────────────────────────────────────────────────────────

/// One immutable entry in a revision chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
  #[serde(flatten)]
  pub key:            RecordKey,
  /// 1-based, contiguous within `key`.
  pub version_number: u32,
  pub content:        String,
  /// `None` for the system-synthesized original captured at bootstrap.
  pub editor_id:      Option<String>,
  pub edit_reason:    Option<String>,
  /// Ledger-assigned, microsecond precision, non-decreasing within a chain.
  pub created_at:     DateTime<Utc>,
  pub content_hash:   String,
  /// [`GENESIS`] for version 1, otherwise the predecessor's `chain_hash`.
  pub previous_hash:  String,
  pub chain_hash:     String,
  pub hash_algorithm: HashAlgorithm,
}

impl Revision {
  /// Build the revision that follows `previous` (or starts the chain when
  /// `previous` is `None`), computing both digests.
  ///
  /// `created_at` is clamped so it never precedes the predecessor's
  /// timestamp, and truncated to stored precision before hashing. Fails with
  /// [`Error::VersionOverflow`] once the chain has used every version number.
  pub fn link(
    algorithm: HashAlgorithm,
    key: RecordKey,
    previous: Option<&ChainTip>,
    edit: RevisionContent,
    created_at: DateTime<Utc>,
  ) -> Result<Self> {
    let mut created_at = hashing::canonical_timestamp(created_at);
    let (version_number, previous_hash) = match previous {
      Some(tip) => {
        created_at = created_at.max(tip.created_at);
        let next = tip
          .version_number
          .checked_add(1)
          .ok_or(Error::VersionOverflow(key))?;
        (next, tip.chain_hash.clone())
      }
      None => (1, GENESIS.to_owned()),
    };

    let content_hash = hashing::content_hash(algorithm, &edit.content);
    let chain_hash =
      hashing::chain_hash(algorithm, &previous_hash, &content_hash, created_at);

    Ok(Self {
      key,
      version_number,
      content: edit.content,
      editor_id: edit.editor_id,
      edit_reason: edit.edit_reason,
      created_at,
      content_hash,
      previous_hash,
      chain_hash,
      hash_algorithm: algorithm,
    })
  }

  /// The chain tip this revision forms once committed.
  pub fn tip(&self) -> ChainTip {
    ChainTip {
      version_number: self.version_number,
      chain_hash:     self.chain_hash.clone(),
      created_at:     self.created_at,
    }
  }

  pub fn is_genesis(&self) -> bool { self.version_number == 1 }
}

// ─── ChainTip ────────────────────────────────────────────────────────────────

/// The latest link of a chain, as read at the start of an append. A commit is
/// conditioned on the tip still being this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
  pub version_number: u32,
  pub chain_hash:     String,
  pub created_at:     DateTime<Utc>,
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// The caller-supplied part of a revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionContent {
  pub content:     String,
  pub editor_id:   Option<String>,
  pub edit_reason: Option<String>,
}

/// Input to [`crate::ledger::Ledger::append`].
/// `created_at` is always set by the ledger; it is not accepted from callers.
#[derive(Debug, Clone)]
pub struct NewEdit {
  pub key:         RecordKey,
  pub content:     String,
  pub editor_id:   Option<String>,
  pub edit_reason: Option<String>,
}

impl NewEdit {
  /// Convenience constructor with no editor or reason.
  pub fn new(key: RecordKey, content: impl Into<String>) -> Self {
    Self {
      key,
      content: content.into(),
      editor_id: None,
      edit_reason: None,
    }
  }

  pub fn by(mut self, editor_id: impl Into<String>) -> Self {
    self.editor_id = Some(editor_id.into());
    self
  }

  pub fn because(mut self, reason: impl Into<String>) -> Self {
    self.edit_reason = Some(reason.into());
    self
  }

  pub(crate) fn revision_content(&self) -> RevisionContent {
    RevisionContent {
      content:     self.content.clone(),
      editor_id:   self.editor_id.clone(),
      edit_reason: self.edit_reason.clone(),
    }
  }
}
