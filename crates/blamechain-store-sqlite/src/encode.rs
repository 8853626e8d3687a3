//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with microsecond precision, the
//! precision chain digests are computed at. Bundle snapshots are stored as
//! JSON. UUIDs are stored as hyphenated lowercase strings.

use blamechain_core::{
  evidence::{DisputeStatus, EvidenceBundle, RevisionFlag},
  hashing::HashAlgorithm,
  revision::Revision,
  source::{RecordKey, SourceKind},
};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── SourceKind ───────────────────────────────────────────────────────────────

pub fn decode_source_kind(s: &str) -> Result<SourceKind> {
  s.parse().map_err(|_| Error::InvalidColumn {
    column: "source_kind",
    value:  s.to_owned(),
  })
}

/// The live-content table backing `kind`.
pub fn content_table(kind: SourceKind) -> &'static str {
  match kind {
    SourceKind::ChatMessage => "chat_messages",
    SourceKind::Transcript => "transcripts",
    SourceKind::DirectMessage => "direct_messages",
  }
}

// ─── HashAlgorithm ────────────────────────────────────────────────────────────

pub fn decode_hash_algorithm(s: &str) -> Result<HashAlgorithm> {
  HashAlgorithm::from_id(s).ok_or_else(|| Error::InvalidColumn {
    column: "hash_algorithm",
    value:  s.to_owned(),
  })
}

// ─── DisputeStatus ────────────────────────────────────────────────────────────

pub fn decode_status(s: &str) -> Result<DisputeStatus> {
  DisputeStatus::from_id(s).ok_or_else(|| Error::InvalidColumn {
    column: "status",
    value:  s.to_owned(),
  })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawRevision::from_row`].
pub const REVISION_COLUMNS: &str = "source_kind, record_id, version_number, \
  content, editor_id, edit_reason, created_at, content_hash, previous_hash, \
  chain_hash, hash_algorithm";

/// Raw values read directly from a `revisions` row.
pub struct RawRevision {
  pub source_kind:    String,
  pub record_id:      i64,
  pub version_number: u32,
  pub content:        String,
  pub editor_id:      Option<String>,
  pub edit_reason:    Option<String>,
  pub created_at:     String,
  pub content_hash:   String,
  pub previous_hash:  String,
  pub chain_hash:     String,
  pub hash_algorithm: String,
}

impl RawRevision {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      source_kind:    row.get(0)?,
      record_id:      row.get(1)?,
      version_number: row.get(2)?,
      content:        row.get(3)?,
      editor_id:      row.get(4)?,
      edit_reason:    row.get(5)?,
      created_at:     row.get(6)?,
      content_hash:   row.get(7)?,
      previous_hash:  row.get(8)?,
      chain_hash:     row.get(9)?,
      hash_algorithm: row.get(10)?,
    })
  }

  pub fn into_revision(self) -> Result<Revision> {
    Ok(Revision {
      key:            RecordKey::new(
        decode_source_kind(&self.source_kind)?,
        self.record_id,
      ),
      version_number: self.version_number,
      content:        self.content,
      editor_id:      self.editor_id,
      edit_reason:    self.edit_reason,
      created_at:     decode_dt(&self.created_at)?,
      content_hash:   self.content_hash,
      previous_hash:  self.previous_hash,
      chain_hash:     self.chain_hash,
      hash_algorithm: decode_hash_algorithm(&self.hash_algorithm)?,
    })
  }
}

/// Column list matching [`RawBundle::from_row`].
pub const BUNDLE_COLUMNS: &str = "bundle_id, snapshot_json, snapshot_digest, \
  status, status_changed_at, resolution_notes";

/// Raw values read directly from an `evidence_bundles` row.
pub struct RawBundle {
  pub bundle_id:         String,
  pub snapshot_json:     String,
  pub snapshot_digest:   String,
  pub status:            String,
  pub status_changed_at: String,
  pub resolution_notes:  Option<String>,
}

impl RawBundle {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      bundle_id:         row.get(0)?,
      snapshot_json:     row.get(1)?,
      snapshot_digest:   row.get(2)?,
      status:            row.get(3)?,
      status_changed_at: row.get(4)?,
      resolution_notes:  row.get(5)?,
    })
  }

  pub fn into_bundle(self) -> Result<EvidenceBundle> {
    Ok(EvidenceBundle {
      bundle_id:         decode_uuid(&self.bundle_id)?,
      snapshot:          serde_json::from_str(&self.snapshot_json)?,
      snapshot_digest:   self.snapshot_digest,
      status:            decode_status(&self.status)?,
      status_changed_at: decode_dt(&self.status_changed_at)?,
      resolution_notes:  self.resolution_notes,
    })
  }
}

/// Raw values read directly from a `revision_flags` row.
pub struct RawFlag {
  pub source_kind:    String,
  pub record_id:      i64,
  pub version_number: u32,
  pub bundle_id:      String,
  pub flagged_at:     String,
}

impl RawFlag {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      source_kind:    row.get(0)?,
      record_id:      row.get(1)?,
      version_number: row.get(2)?,
      bundle_id:      row.get(3)?,
      flagged_at:     row.get(4)?,
    })
  }

  pub fn into_flag(self) -> Result<RevisionFlag> {
    Ok(RevisionFlag {
      key:            RecordKey::new(
        decode_source_kind(&self.source_kind)?,
        self.record_id,
      ),
      version_number: self.version_number,
      bundle_id:      decode_uuid(&self.bundle_id)?,
      flagged_at:     decode_dt(&self.flagged_at)?,
    })
  }
}
