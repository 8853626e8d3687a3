//! The storage traits the ledger runs on.
//!
//! [`ContentStore`] is the host application's live-record store: one mutable
//! content value per [`RecordKey`]. [`LedgerStore`] adds the append-only
//! revision log and evidence metadata. A backend implements both over the
//! same transactional engine so that a revision append and the matching live
//! content update commit together or not at all.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  evidence::{DisputeStatus, EvidenceBundle, RevisionFlag},
  revision::{ChainTip, Revision},
  source::RecordKey,
};

// ─── Commit types ────────────────────────────────────────────────────────────

/// One atomic append: the new revision(s) plus the live content they imply.
#[derive(Debug, Clone)]
pub struct AppendCommit {
  pub key:          RecordKey,
  /// The tip the revisions were linked against; `None` when bootstrapping.
  /// The commit must be rejected if the stored tip differs.
  pub expected_tip: Option<ChainTip>,
  /// Revisions to insert, in version order. Two on bootstrap, else one.
  pub revisions:    Vec<Revision>,
  /// New live content; always the last revision's content.
  pub content:      String,
}

/// How a backend disposed of an [`AppendCommit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
  Committed,
  /// The chain tip moved since it was read. Nothing was written.
  Conflict,
  /// The live record no longer exists. Nothing was written.
  RecordMissing,
}

/// Outcome of a conditional dispute status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
  Applied(EvidenceBundle),
  /// The bundle exists but was not in the expected status.
  StatusChanged(DisputeStatus),
  NotFound,
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// The live-content side: the single current copy of each record.
pub trait ContentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Current content of `key`, or `None` if no such record exists.
  fn read_content(
    &self,
    key: RecordKey,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  /// Create a record with initial content. Does not touch the revision log:
  /// the ledger captures this content as version 1 on the first edit.
  ///
  /// Returns `false` if the record exists, or if `key` already has revisions.
  /// A deleted record cannot be re-created, since the next edit would link
  /// onto the old chain without capturing the new content.
  fn create_record(
    &self,
    key: RecordKey,
    content: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Delete the live record. Its revision chain is retained. Returns `false`
  /// if there was nothing to delete.
  fn delete_record(
    &self,
    key: RecordKey,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

/// Abstraction over a Blamechain ledger backend.
///
/// Revisions are append-only: the trait has no method that updates or
/// deletes one. Evidence writes touch bundle and flag records only.
pub trait LedgerStore: ContentStore {
  // ── Revisions ─────────────────────────────────────────────────────────

  /// The highest-versioned revision for `key`, read fresh from storage.
  fn latest_revision(
    &self,
    key: RecordKey,
  ) -> impl Future<Output = Result<Option<Revision>, Self::Error>> + Send + '_;

  /// Every revision for `key`, ordered by version.
  fn revisions(
    &self,
    key: RecordKey,
  ) -> impl Future<Output = Result<Vec<Revision>, Self::Error>> + Send + '_;

  /// A single revision by version number.
  fn revision(
    &self,
    key: RecordKey,
    version_number: u32,
  ) -> impl Future<Output = Result<Option<Revision>, Self::Error>> + Send + '_;

  /// Atomically check the chain tip, insert `commit.revisions`, and set the
  /// live content. Either everything is written or nothing is.
  fn commit_append(
    &self,
    commit: AppendCommit,
  ) -> impl Future<Output = Result<CommitOutcome, Self::Error>> + Send + '_;

  // ── Evidence ──────────────────────────────────────────────────────────

  fn insert_bundle(
    &self,
    bundle: EvidenceBundle,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_bundle(
    &self,
    bundle_id: Uuid,
  ) -> impl Future<Output = Result<Option<EvidenceBundle>, Self::Error>> + Send + '_;

  /// Move a bundle from `from` to `to` only if it is still in `from`.
  fn transition_bundle(
    &self,
    bundle_id: Uuid,
    from: DisputeStatus,
    to: DisputeStatus,
    at: DateTime<Utc>,
    notes: Option<String>,
  ) -> impl Future<Output = Result<TransitionOutcome, Self::Error>> + Send + '_;

  /// Record a flag for each listed version. Flags already present are left
  /// untouched. Returns the flags for `bundle_id` on `key` after the write.
  fn flag_revisions(
    &self,
    bundle_id: Uuid,
    key: RecordKey,
    versions: Vec<u32>,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<RevisionFlag>, Self::Error>> + Send + '_;

  /// Every flag on any revision of `key`.
  fn revision_flags(
    &self,
    key: RecordKey,
  ) -> impl Future<Output = Result<Vec<RevisionFlag>, Self::Error>> + Send + '_;
}
